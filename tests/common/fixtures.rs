use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{ImageBuffer, Rgb};
use tabsort::Result;
use tabsort::config::Config;
use tabsort::detection::Detector;
use tabsort::models::{BoundingBox, Detection};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Writes a solid `width`x`height` JPEG with the given red level.
pub fn write_image(dir: &Path, name: &str, width: u32, height: u32, red: u8) -> PathBuf {
    std::fs::create_dir_all(dir).expect("Failed to create image dir");
    let img = ImageBuffer::from_fn(width, height, |_, _| Rgb([red, 40u8, 40u8]));
    let path = dir.join(name);
    img.save(&path).expect("Failed to save test image");
    path
}

/// Red images carry tabs, dark ones don't.
pub const WITH_TAB: u8 = 230;
pub const WITHOUT_TAB: u8 = 20;

/// Detector whose single detection scores the red level at the canvas center.
pub struct RedDetector;

impl Detector for RedDetector {
    fn detect(&self, tensor: &[f32], size: u32) -> Result<Vec<Detection>> {
        let side = size as usize;
        let confidence = tensor[(side / 2) * side + side / 2];
        let c = size as f32 / 2.0;
        Ok(vec![Detection::new(
            confidence,
            BoundingBox::from_center(c, c, 20.0, 20.0),
            0,
        )])
    }

    fn name(&self) -> &str {
        "red"
    }
}

/// Default config rooted in `root`, with tiny images and no pauses.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths.images_dir = root.join("images");
    config.paths.sorted_dir = root.join("images");
    config.paths.asset_log = root.join("image_log.json");
    config.paths.model = root.join("missing.rten");
    config.sort.image_size = 64;
    config.marketplace.initial_backoff_ms = 1;
    config.marketplace.image_delay_ms = 0;
    config.marketplace.item_delay_ms = 0;
    config
}

/// Canned reply of the scripted server.
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn json(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: body.to_string().into_bytes(),
        }
    }

    pub fn bytes(body: &[u8]) -> Self {
        Self {
            status: 200,
            content_type: "image/jpeg",
            body: body.to_vec(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: Vec::new(),
        }
    }
}

/// Minimal HTTP/1.1 server answering every request through `route`.
/// Records `"<METHOD> <path>"` of each request it sees.
pub struct ScriptedServer {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<String>>>,
    pub hits: Arc<AtomicUsize>,
}

impl ScriptedServer {
    pub async fn start<F>(route: F) -> Self
    where
        F: Fn(&str, &str, usize) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let hits = Arc::new(AtomicUsize::new(0));
        let route = Arc::new(route);

        let seen = requests.clone();
        let counter = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let head = read_head(&mut socket).await;
                let mut parts = head.split_whitespace();
                let method = parts.next().unwrap_or_default().to_string();
                let target = parts.next().unwrap_or_default().to_string();
                let path = target.split('?').next().unwrap_or_default().to_string();

                let n = counter.fetch_add(1, Ordering::SeqCst);
                seen.lock().unwrap().push(format!("{} {}", method, target));
                let reply = route(&method, &path, n);

                let header = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: {}\r\nContent-Length: {}\r\n\
                     Connection: close\r\n\r\n",
                    reply.status,
                    reply.content_type,
                    reply.body.len()
                );
                let _ = socket.write_all(header.as_bytes()).await;
                let _ = socket.write_all(&reply.body).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            base_url,
            requests,
            hits,
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Reads the request head and any body, returning the head.
async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break buf.len();
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();

    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    let mut body_read = buf.len() - head_end;
    while body_read < content_length {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        body_read += n;
    }
    head
}
