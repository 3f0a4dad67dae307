pub mod fake_player;
