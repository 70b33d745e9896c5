//! QR code generation for the browser download link.
//!
//! `cpd send` prints a QR code of the landing-page URL so a phone on the
//! same network can download the file without typing an address.

use qrcode::render::unicode;
use qrcode::{EcLevel, QrCode};

use crate::error::{Error, Result};

/// Generate ASCII art QR code for terminal display.
///
/// Uses Unicode block characters for compact display in terminals.
///
/// # Errors
///
/// Returns an error if QR code generation fails.
pub fn generate_ascii(url: &str) -> Result<String> {
    let qr_code = QrCode::with_error_correction_level(url, EcLevel::M)
        .map_err(|e| Error::Internal(format!("Failed to generate QR code: {e}")))?;

    let rendered = qr_code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build();

    Ok(rendered)
}
