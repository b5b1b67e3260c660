//! Terminal rendering of WhatsApp pairing codes.

use qrcode::{Color, QrCode};

use crate::error::ChannelError;

/// Light border, in modules, that scanners need around the code.
const QUIET_ZONE: usize = 4;

/// Render a pairing code as a QR code made of Unicode half blocks.
///
/// Two module rows are packed into each text line, so the result is
/// roughly square in a terminal. No ANSI escapes are used.
pub fn render_pairing_qr(code: &str) -> Result<String, ChannelError> {
    let qr = QrCode::new(code.as_bytes())
        .map_err(|e| ChannelError::InvalidMessage(format!("pairing code cannot be encoded: {e}")))?;
    let width = qr.width();
    let modules = qr.to_colors();
    let total = width + QUIET_ZONE * 2;

    let color_at = |x: usize, y: usize| {
        let inside = (QUIET_ZONE..QUIET_ZONE + width).contains(&x)
            && (QUIET_ZONE..QUIET_ZONE + width).contains(&y);
        if inside {
            modules[(y - QUIET_ZONE) * width + (x - QUIET_ZONE)]
        } else {
            Color::Light
        }
    };

    let mut out = String::with_capacity((total + 1) * total.div_ceil(2) * 3);
    for y in (0..total).step_by(2) {
        for x in 0..total {
            let top = color_at(x, y);
            let bottom = if y + 1 < total { color_at(x, y + 1) } else { Color::Light };
            out.push(match (top, bottom) {
                (Color::Light, Color::Light) => ' ',
                (Color::Dark, Color::Dark) => '\u{2588}',
                (Color::Dark, Color::Light) => '\u{2580}',
                (Color::Light, Color::Dark) => '\u{2584}',
            });
        }
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_square_block_art_with_quiet_zone() {
        let code = "2@Xy7Qk1n3aB9cD,kZ1+aBcDeF=,q9W8e7R6t5Y4=,Fj3K";
        let art = render_pairing_qr(code).unwrap();
        let lines: Vec<&str> = art.lines().collect();

        let width = QrCode::new(code.as_bytes()).unwrap().width() + QUIET_ZONE * 2;
        assert_eq!(lines.len(), width.div_ceil(2));
        assert!(lines.iter().all(|line| line.chars().count() == width));

        // The first two module rows are border, so the first line is blank.
        assert!(lines[0].chars().all(|c| c == ' '));
        assert!(art.contains('\u{2588}'));
        assert!(!art.contains('\u{1b}'));
    }

    #[test]
    fn same_code_renders_identically() {
        assert_eq!(
            render_pairing_qr("2@same").unwrap(),
            render_pairing_qr("2@same").unwrap()
        );
        assert_ne!(
            render_pairing_qr("2@same").unwrap(),
            render_pairing_qr("2@different").unwrap()
        );
    }

    #[test]
    fn oversized_code_is_rejected() {
        let err = render_pairing_qr(&"x".repeat(8000)).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidMessage(_)));
    }
}
