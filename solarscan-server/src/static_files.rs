use axum::response::{Html, IntoResponse};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>SolarScan</title>
    <style>
        body { font-family: sans-serif; max-width: 960px; margin: 2em auto; }
        img { max-width: 45%; margin-right: 1em; }
        pre { background: #f4f4f4; padding: 1em; overflow-x: auto; }
    </style>
</head>
<body>
    <h1>SolarScan</h1>
    <form id="predict" method="post" action="/predict">
        <label>Latitude <input name="latitude" required></label>
        <label>Longitude <input name="longitude" required></label>
        <button type="submit">Check rooftop</button>
    </form>
    <div id="images"></div>
    <pre id="result"></pre>
    <script>
        document.getElementById('predict').addEventListener('submit', async (event) => {
            event.preventDefault();
            const body = new URLSearchParams(new FormData(event.target));
            const response = await fetch('/predict', { method: 'POST', body });
            const record = await response.json();
            document.getElementById('result').textContent = JSON.stringify(record, null, 2);
            const images = document.getElementById('images');
            images.innerHTML = '';
            for (const url of [record.tile_image_url, record.overlay_image_url]) {
                if (url) {
                    const img = document.createElement('img');
                    img.src = url;
                    images.appendChild(img);
                }
            }
        });
    </script>
</body>
</html>
"#;

/// Landing page with the coordinate form
pub async fn serve_index() -> impl IntoResponse {
    Html(INDEX_HTML)
}

/// Delete the oldest `.jpg` images in `dir` until at most `keep` remain.
/// Returns the number of files removed.
pub fn prune_outputs(dir: &Path, keep: usize) -> io::Result<usize> {
    if keep == 0 {
        return Ok(0);
    }

    let mut images: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jpg") {
            continue;
        }
        let meta = entry.metadata()?;
        if meta.is_file() {
            images.push((meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), path));
        }
    }

    if images.len() <= keep {
        return Ok(0);
    }

    images.sort();
    let excess = images.len() - keep;
    let mut removed = 0;
    for (_, path) in images.into_iter().take(excess) {
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Could not remove {:?}: {}", path, e),
        }
    }
    Ok(removed)
}
