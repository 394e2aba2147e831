//! Pairing endpoint: `GET /bot/qrcode` renders the latest pairing code as a PNG.

use core::future::Future;
use std::{io::Cursor, net::SocketAddr};

use anyhow::{Context as _, Result};
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse as _, Response},
    routing::get,
};
use image::{ImageBuffer, Luma};
use qrcode::{Color, EcLevel, QrCode};
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use bot_core::EventBus;

const MODULE_SIZE: u32 = 10;
const QUIET_ZONE: u32 = 2;

pub fn router(bus: EventBus) -> Router {
    Router::new()
        .route("/bot/qrcode", get(qrcode))
        .with_state(bus)
}

async fn qrcode(State(bus): State<EventBus>) -> Response {
    let Some(payload) = bus.latest_pairing() else {
        return (StatusCode::NOT_FOUND, "QR Code not found").into_response();
    };
    match render_png(&payload) {
        Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render pairing QR");
            (StatusCode::INTERNAL_SERVER_ERROR, "QR Code could not be rendered").into_response()
        }
    }
}

/// Black-on-white PNG of `data` with a small quiet zone.
pub fn render_png(data: &str) -> Result<Vec<u8>> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)
        .context("QR generation failed")?;

    let modules = u32::try_from(code.width()).context("QR code too wide")?;
    let img_size = (modules + QUIET_ZONE * 2) * MODULE_SIZE;

    let img = ImageBuffer::from_fn(img_size, img_size, |x, y| {
        let (cx, cy) = (x / MODULE_SIZE, y / MODULE_SIZE);
        if cx < QUIET_ZONE || cy < QUIET_ZONE {
            return Luma([255u8]);
        }
        let (mx, my) = ((cx - QUIET_ZONE) as usize, (cy - QUIET_ZONE) as usize);
        if mx >= code.width() || my >= code.width() {
            return Luma([255u8]);
        }
        match code[(mx, my)] {
            Color::Dark => Luma([0u8]),
            Color::Light => Luma([255u8]),
        }
    });

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .context("PNG encoding failed")?;
    Ok(buf.into_inner())
}

pub async fn serve(
    addr: SocketAddr,
    bus: EventBus,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %listener.local_addr().unwrap_or(addr), "Pairing endpoint listening");
    axum::serve(listener, router(bus))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server")
}

/// Run [`serve`] on a tracked task; a bind or server failure is logged when it happens.
pub fn spawn(
    tracker: &TaskTracker,
    addr: SocketAddr,
    bus: EventBus,
    shutdown: impl Future<Output = ()> + Send + 'static,
) {
    tracker.spawn(async move {
        if let Err(e) = serve(addr, bus, shutdown).await {
            error!(addr = %addr, error = ?e, "Pairing endpoint failed; /bot/qrcode is unavailable");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    #[tokio::test]
    async fn no_pairing_code_is_not_found() {
        let response = qrcode(State(EventBus::new())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn latest_pairing_code_is_served_as_png() {
        let bus = EventBus::new();
        bus.publish_pairing("2@old");
        bus.publish_pairing("2@abcdef,ghijkl");
        let response = qrcode(State(bus)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/png"
        );
    }

    #[test]
    fn render_produces_png_bytes() {
        let png = render_png("2@abcdef,ghijkl").unwrap();
        assert!(png.starts_with(PNG_MAGIC));
    }

    #[tokio::test]
    async fn bind_failure_ends_the_task_right_away() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();
        assert!(serve(addr, EventBus::new(), core::future::pending()).await.is_err());

        let tracker = TaskTracker::new();
        spawn(&tracker, addr, EventBus::new(), core::future::pending());
        tracker.close();
        assert!(tokio::time::timeout(Duration::from_secs(2), tracker.wait()).await.is_ok());
    }
}
