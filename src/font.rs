//! Standard PDF fonts and their metrics
//!
//! Watermarks are drawn with one of the standard 14 Type1 fonts, so nothing has
//! to be embedded. Widths come from the Adobe AFM files, in 1/1000ths of the
//! em square, indexed by WinAnsiEncoding character code.

use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

/// Standard Type1 fonts usable for watermark text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StandardFont {
    #[default]
    Helvetica,
    Courier,
}

impl StandardFont {
    /// PostScript name used as /BaseFont
    pub fn base_font(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::Courier => "Courier",
        }
    }

    /// Ascender in 1/1000 em
    pub fn ascent(&self) -> f32 {
        match self {
            StandardFont::Helvetica => 718.0,
            StandardFont::Courier => 629.0,
        }
    }

    /// Descender in 1/1000 em (negative, below the baseline)
    pub fn descent(&self) -> f32 {
        match self {
            StandardFont::Helvetica => -207.0,
            StandardFont::Courier => -157.0,
        }
    }

    /// Advance width of a WinAnsi code in 1/1000 em
    ///
    /// Codes below 32 and the five undefined WinAnsi slots have no glyph and
    /// advance by zero.
    pub fn glyph_width(&self, code: u8) -> f32 {
        if code < 32 || matches!(code, 127 | 129 | 141 | 143 | 144 | 157) {
            return 0.0;
        }
        match self {
            StandardFont::Helvetica => HELVETICA_WIDTHS[(code - 32) as usize] as f32,
            StandardFont::Courier => 600.0,
        }
    }

    /// Width of encoded text at the given size, in points
    pub fn text_width(&self, encoded: &[u8], font_size: f32) -> f32 {
        encoded.iter().map(|&c| self.glyph_width(c)).sum::<f32>() * font_size / 1000.0
    }

    /// Convert text to WinAnsi bytes, rejecting characters the font cannot show
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        text.chars()
            .map(|ch| {
                win_ansi_code(ch).ok_or_else(|| {
                    Error::Render(format!(
                        "character {:?} (U+{:04X}) is not available in {}",
                        ch,
                        ch as u32,
                        self.base_font()
                    ))
                })
            })
            .collect()
    }
}

/// Check that a font size can be drawn
pub fn check_font_size(font_size: f32) -> Result<()> {
    if font_size.is_finite() && font_size > 0.0 {
        Ok(())
    } else {
        Err(Error::Render(format!("font size {} cannot be rendered", font_size)))
    }
}

/// Map a Unicode character to its WinAnsiEncoding code
fn win_ansi_code(ch: char) -> Option<u8> {
    let code = match ch {
        '\u{20}'..='\u{7e}' | '\u{a0}'..='\u{ff}' => ch as u32 as u8,
        '€' => 128,
        '‚' => 130,
        'ƒ' => 131,
        '„' => 132,
        '…' => 133,
        '†' => 134,
        '‡' => 135,
        'ˆ' => 136,
        '‰' => 137,
        'Š' => 138,
        '‹' => 139,
        'Œ' => 140,
        'Ž' => 142,
        '‘' => 145,
        '’' => 146,
        '“' => 147,
        '”' => 148,
        '•' => 149,
        '–' => 150,
        '—' => 151,
        '˜' => 152,
        '™' => 153,
        'š' => 154,
        '›' => 155,
        'œ' => 156,
        'ž' => 158,
        'Ÿ' => 159,
        _ => return None,
    };
    Some(code)
}

/// Helvetica widths for WinAnsi codes 32-255 (zero entries are undefined slots)
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 224] = [
    // 32-47: space ! " # $ % & ' ( ) * + , - . /
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    // 48-63: 0-9 : ; < = > ?
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    // 64-79: @ A-O
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    // 80-95: P-Z [ \ ] ^ _
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    // 96-111: ` a-o
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    // 112-127: p-z { | } ~ DEL
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, 0,
    // 128-143: Euro, quotes, dagger, per mille, Scaron, OE, Zcaron
    556, 0, 222, 556, 333, 1000, 556, 556, 333, 1000, 667, 333, 1000, 0, 611, 0,
    // 144-159: curly quotes, bullet, dashes, tilde, trademark, scaron, oe, zcaron, Ydieresis
    0, 222, 222, 333, 333, 350, 556, 1000, 333, 1000, 500, 333, 944, 0, 500, 667,
    // 160-175: nbsp ¡ ¢ £ ¤ ¥ ¦ § ¨ © ª « ¬ soft-hyphen ® ¯
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333,
    // 176-191: ° ± ² ³ ´ µ ¶ · ¸ ¹ º » ¼ ½ ¾ ¿
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    // 192-207: À-Ï
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    // 208-223: Ð-ß
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    // 224-239: à-ï
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278,
    // 240-255: ð-ÿ
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helvetica_ascii_widths() {
        let font = StandardFont::Helvetica;
        assert_eq!(font.glyph_width(b' '), 278.0);
        assert_eq!(font.glyph_width(b'A'), 667.0);
        assert_eq!(font.glyph_width(b'W'), 944.0);
        assert_eq!(font.glyph_width(b'i'), 222.0);
        assert_eq!(font.glyph_width(b'~'), 584.0);
    }

    #[test]
    fn test_undefined_codes_have_no_width() {
        let font = StandardFont::Helvetica;
        assert_eq!(font.glyph_width(129), 0.0);
        assert_eq!(font.glyph_width(157), 0.0);
        assert_eq!(font.glyph_width(0x09), 0.0);
    }

    #[test]
    fn test_courier_is_monospaced() {
        let font = StandardFont::Courier;
        let encoded = font.encode("iW").unwrap();
        assert_eq!(font.text_width(&encoded, 10.0), 12.0);
    }

    #[test]
    fn test_text_width_scales_with_size() {
        let font = StandardFont::Helvetica;
        let encoded = font.encode("AB").unwrap();
        // A = 667, B = 667
        assert!((font.text_width(&encoded, 10.0) - 13.34).abs() < 1e-4);
        assert!((font.text_width(&encoded, 20.0) - 26.68).abs() < 1e-4);
    }

    #[test]
    fn test_encode_win_ansi() {
        let font = StandardFont::Helvetica;
        assert_eq!(font.encode("Año €").unwrap(), vec![b'A', 0xF1, b'o', b' ', 128]);
    }

    #[test]
    fn test_encode_rejects_unsupported_characters() {
        let result = StandardFont::Helvetica.encode("漢字");
        assert!(matches!(result, Err(Error::Render(_))));
    }

    #[test]
    fn test_check_font_size() {
        assert!(check_font_size(18.0).is_ok());
        assert!(check_font_size(0.0).is_err());
        assert!(check_font_size(-4.0).is_err());
        assert!(check_font_size(f32::NAN).is_err());
    }
}
