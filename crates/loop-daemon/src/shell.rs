//! Line-oriented console front end: stdin lines → `ShellCommand`s for the
//! core loop, plus the text rendering of the playlist.

use std::io::BufRead;

use loop_core::{LoopBookmark, SelectionBridge};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::AppEvent;

pub const HELP: &str = "\
commands:
  add <url|id> <start> <end>   save a loop and start it (times: seconds or m:ss)
  list                         show saved loops
  select <n|id>                load a saved loop (does not start it)
  play                         start the loaded loop
  stop                         stop looping and pause
  rename <n|id> <title…>       rename a saved loop
  delete <n|id>                delete a saved loop
  clear                        delete every saved loop
  thumb <n|id>                 print the thumbnail URL
  help                         this text
  quit                         exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Add { url: String, start: String, end: String },
    List,
    Select(String),
    Play,
    Stop,
    Rename { target: String, title: String },
    Delete(String),
    Clear,
    Thumb(String),
    Help,
    Quit,
}

/// `Ok(None)` for blank lines; `Err` carries a usage message.
pub fn parse_line(line: &str) -> Result<Option<ShellCommand>, String> {
    let line = line.trim();
    let Some((verb, rest)) = split_word(line) else {
        return Ok(None);
    };

    let cmd = match verb.to_ascii_lowercase().as_str() {
        "add" => {
            let args: Vec<&str> = rest.split_whitespace().collect();
            let [url, start, end] = args[..] else {
                return Err("usage: add <url|id> <start> <end>".into());
            };
            ShellCommand::Add {
                url: url.to_string(),
                start: start.to_string(),
                end: end.to_string(),
            }
        }
        "list" | "ls" => ShellCommand::List,
        "select" => ShellCommand::Select(one_arg(rest, "select <n|id>")?),
        "play" | "start" => ShellCommand::Play,
        "stop" => ShellCommand::Stop,
        "rename" => {
            let (target, title) = split_word(rest).ok_or("usage: rename <n|id> <title>")?;
            ShellCommand::Rename {
                target: target.to_string(),
                title: title.to_string(),
            }
        }
        "delete" | "rm" => ShellCommand::Delete(one_arg(rest, "delete <n|id>")?),
        "clear" => ShellCommand::Clear,
        "thumb" => ShellCommand::Thumb(one_arg(rest, "thumb <n|id>")?),
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => return Err(format!("unknown command {:?} (try help)", other)),
    };
    Ok(Some(cmd))
}

fn split_word(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(idx) => Some((&s[..idx], s[idx..].trim())),
        None => Some((s, "")),
    }
}

fn one_arg(rest: &str, usage: &str) -> Result<String, String> {
    match rest.split_whitespace().collect::<Vec<_>>()[..] {
        [arg] => Ok(arg.to_string()),
        _ => Err(format!("usage: {}", usage)),
    }
}

/// Playlist view: count line, then one row per loop, selected row starred.
pub fn render_list(items: &[LoopBookmark], bridge: &SelectionBridge) -> String {
    let noun = if items.len() == 1 { "loop" } else { "loops" };
    let mut out = format!("{} {} saved", items.len(), noun);
    if items.is_empty() {
        out.push_str("\nNo loops yet. Add your first loop!");
    }
    for (i, b) in items.iter().enumerate() {
        let marker = if bridge.is_selected(&b.video_id) { '*' } else { ' ' };
        out.push_str(&format!(
            "\n{} {:>2}. {}  {}  [{}]",
            marker,
            i + 1,
            b.title,
            b.range_label(),
            b.video_id
        ));
    }
    out
}

/// Forward stdin lines to the core.  EOF or a read error ends the session.
/// A blocked stdin read cannot be cancelled, so this is a plain thread.
pub fn spawn_stdin_reader(event_tx: mpsc::Sender<AppEvent>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("shell: stdin read error: {}", e);
                    break;
                }
            };
            match parse_line(&line) {
                Ok(Some(cmd)) => {
                    if event_tx.blocking_send(AppEvent::Shell(cmd)).is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(usage) => println!("{}", usage),
            }
        }
        info!("shell: stdin closed");
        let _ = event_tx.blocking_send(AppEvent::Shutdown);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use loop_core::{LoopController, VideoId};

    #[test]
    fn test_parse_add() {
        assert_eq!(
            parse_line("add https://youtu.be/dQw4w9WgXcQ 0:30 1:30").unwrap(),
            Some(ShellCommand::Add {
                url: "https://youtu.be/dQw4w9WgXcQ".into(),
                start: "0:30".into(),
                end: "1:30".into(),
            })
        );
        assert!(parse_line("add dQw4w9WgXcQ 0:30").is_err());
    }

    #[test]
    fn test_parse_rename_keeps_spaces_in_title() {
        assert_eq!(
            parse_line("rename 2   The  Bridge ").unwrap(),
            Some(ShellCommand::Rename {
                target: "2".into(),
                title: "The  Bridge".into(),
            })
        );
        assert_eq!(
            parse_line("rename 2").unwrap(),
            Some(ShellCommand::Rename {
                target: "2".into(),
                title: String::new(),
            })
        );
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("PLAY").unwrap(), Some(ShellCommand::Play));
        assert_eq!(parse_line("rm 1").unwrap(), Some(ShellCommand::Delete("1".into())));
        assert!(parse_line("select").is_err());
        assert!(parse_line("select 1 2").is_err());
        assert!(parse_line("dance").is_err());
    }

    #[test]
    fn test_render_list() {
        let bridge = SelectionBridge::new();
        assert_eq!(
            render_list(&[], &bridge),
            "0 loops saved\nNo loops yet. Add your first loop!"
        );

        let mut bridge = SelectionBridge::new();
        let mut controller = LoopController::default();
        let a = LoopBookmark::new(VideoId::new("dQw4w9WgXcQ"), 30, 90).unwrap();
        bridge.select(&a, &mut controller).unwrap();
        let text = render_list(std::slice::from_ref(&a), &bridge);
        assert_eq!(
            text,
            "1 loop saved\n*  1. Loop dQw4w9Wg  0:30 \u{2013} 1:30  [dQw4w9WgXcQ]"
        );
    }
}
