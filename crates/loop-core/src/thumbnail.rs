//! Thumbnail URLs from the conventional image endpoint.
//!
//! Not every video has a `maxresdefault` image; `default.jpg` always exists.

use tracing::debug;

use crate::bookmark::VideoId;

const IMAGE_HOST: &str = "https://img.youtube.com/vi";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailQuality {
    MaxRes,
    Default,
}

impl ThumbnailQuality {
    fn file_name(self) -> &'static str {
        match self {
            Self::MaxRes => "maxresdefault.jpg",
            Self::Default => "default.jpg",
        }
    }
}

pub fn thumbnail_url(video_id: &VideoId, quality: ThumbnailQuality) -> String {
    url_on(IMAGE_HOST, video_id, quality)
}

fn url_on(host: &str, video_id: &VideoId, quality: ThumbnailQuality) -> String {
    format!("{}/{}/{}", host, video_id, quality.file_name())
}

/// The high-resolution thumbnail if the endpoint has one, else the
/// low-resolution URL.  Network errors fall back too.
pub async fn resolve_thumbnail(client: &reqwest::Client, video_id: &VideoId) -> String {
    resolve_on(client, IMAGE_HOST, video_id).await
}

async fn resolve_on(client: &reqwest::Client, host: &str, video_id: &VideoId) -> String {
    let hi = url_on(host, video_id, ThumbnailQuality::MaxRes);
    match client.head(&hi).send().await {
        Ok(resp) if resp.status().is_success() => hi,
        Ok(resp) => {
            debug!("thumbnail: {} → {}, using default", hi, resp.status());
            url_on(host, video_id, ThumbnailQuality::Default)
        }
        Err(e) => {
            debug!("thumbnail: {} failed: {}", hi, e);
            url_on(host, video_id, ThumbnailQuality::Default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_urls() {
        let id = VideoId::new("dQw4w9WgXcQ");
        assert_eq!(
            thumbnail_url(&id, ThumbnailQuality::MaxRes),
            "https://img.youtube.com/vi/dQw4w9WgXcQ/maxresdefault.jpg"
        );
        assert_eq!(
            thumbnail_url(&id, ThumbnailQuality::Default),
            "https://img.youtube.com/vi/dQw4w9WgXcQ/default.jpg"
        );
    }

    fn local_client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    /// Answers every request with `status` and an empty body.
    async fn serve_status(status: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let mut seen = Vec::new();
                while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                    match sock.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => seen.extend_from_slice(&buf[..n]),
                    }
                }
                let reply = format!(
                    "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status
                );
                let _ = sock.write_all(reply.as_bytes()).await;
            }
        });
        format!("http://{}/vi", addr)
    }

    #[tokio::test]
    async fn test_resolve_prefers_high_resolution() {
        let host = serve_status("200 OK").await;
        let id = VideoId::new("dQw4w9WgXcQ");
        let url = resolve_on(&local_client(), &host, &id).await;
        assert_eq!(url, format!("{}/dQw4w9WgXcQ/maxresdefault.jpg", host));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_when_missing() {
        let host = serve_status("404 Not Found").await;
        let id = VideoId::new("dQw4w9WgXcQ");
        let url = resolve_on(&local_client(), &host, &id).await;
        assert_eq!(url, format!("{}/dQw4w9WgXcQ/default.jpg", host));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_when_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = format!("http://{}/vi", listener.local_addr().unwrap());
        drop(listener);

        let id = VideoId::new("dQw4w9WgXcQ");
        let url = resolve_on(&local_client(), &host, &id).await;
        assert_eq!(url, format!("{}/dQw4w9WgXcQ/default.jpg", host));
    }
}
