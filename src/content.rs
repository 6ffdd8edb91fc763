//! Content stream composer
//!
//! Accumulates page-content operators as bytes. Every method returns
//! `&mut Self` so drawing code can chain calls.

use crate::object::format_number;
use crate::writer::literal_string;

/// Builds a content stream from graphics and text operators
#[derive(Debug, Default, Clone)]
pub struct ContentComposer {
    buf: Vec<u8>,
}

impl ContentComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn operands(&mut self, values: &[f64]) {
        for v in values {
            self.buf.extend_from_slice(format_number(*v).as_bytes());
            self.buf.push(b' ');
        }
    }

    fn op(&mut self, operator: &str) -> &mut Self {
        self.buf.extend_from_slice(operator.as_bytes());
        self.buf.push(b'\n');
        self
    }

    fn name(&mut self, name: &str) {
        self.buf.push(b'/');
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.push(b' ');
    }

    /// Save graphics state (q)
    pub fn save_state(&mut self) -> &mut Self {
        self.op("q")
    }

    /// Restore graphics state (Q)
    pub fn restore_state(&mut self) -> &mut Self {
        self.op("Q")
    }

    /// Concatenate a matrix to the CTM (cm)
    pub fn transform(&mut self, a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> &mut Self {
        self.operands(&[a, b, c, d, e, f]);
        self.op("cm")
    }

    pub fn translate(&mut self, tx: f64, ty: f64) -> &mut Self {
        self.transform(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// Rotate counter-clockwise by `degrees`
    pub fn rotate_degrees(&mut self, degrees: f64) -> &mut Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        self.transform(cos, sin, -sin, cos, 0.0, 0.0)
    }

    pub fn set_line_width(&mut self, width: f64) -> &mut Self {
        self.operands(&[width]);
        self.op("w")
    }

    /// Line cap style (J): 0 butt, 1 round, 2 projecting square
    pub fn set_line_cap(&mut self, cap: u8) -> &mut Self {
        self.operands(&[cap as f64]);
        self.op("J")
    }

    pub fn set_fill_gray(&mut self, gray: f64) -> &mut Self {
        self.operands(&[gray]);
        self.op("g")
    }

    pub fn set_stroke_gray(&mut self, gray: f64) -> &mut Self {
        self.operands(&[gray]);
        self.op("G")
    }

    pub fn set_fill_color(&mut self, r: f64, g: f64, b: f64) -> &mut Self {
        self.operands(&[r, g, b]);
        self.op("rg")
    }

    /// Apply a named ExtGState from the resources (gs)
    pub fn set_ext_gstate(&mut self, name: &str) -> &mut Self {
        self.name(name);
        self.op("gs")
    }

    pub fn move_to(&mut self, x: f64, y: f64) -> &mut Self {
        self.operands(&[x, y]);
        self.op("m")
    }

    pub fn line_to(&mut self, x: f64, y: f64) -> &mut Self {
        self.operands(&[x, y]);
        self.op("l")
    }

    pub fn rect(&mut self, x: f64, y: f64, width: f64, height: f64) -> &mut Self {
        self.operands(&[x, y, width, height]);
        self.op("re")
    }

    pub fn close_path(&mut self) -> &mut Self {
        self.op("h")
    }

    pub fn stroke(&mut self) -> &mut Self {
        self.op("S")
    }

    pub fn fill(&mut self) -> &mut Self {
        self.op("f")
    }

    pub fn fill_stroke(&mut self) -> &mut Self {
        self.op("B")
    }

    pub fn begin_text(&mut self) -> &mut Self {
        self.op("BT")
    }

    pub fn end_text(&mut self) -> &mut Self {
        self.op("ET")
    }

    pub fn set_font(&mut self, name: &str, size: f64) -> &mut Self {
        self.name(name);
        self.operands(&[size]);
        self.op("Tf")
    }

    pub fn set_text_matrix(&mut self, a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> &mut Self {
        self.operands(&[a, b, c, d, e, f]);
        self.op("Tm")
    }

    pub fn move_text(&mut self, tx: f64, ty: f64) -> &mut Self {
        self.operands(&[tx, ty]);
        self.op("Td")
    }

    /// Show already-encoded text bytes (Tj)
    pub fn show_text(&mut self, encoded: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(&literal_string(encoded));
        self.buf.push(b' ');
        self.op("Tj")
    }

    /// Paint a named XObject (Do)
    pub fn draw_xobject(&mut self, name: &str) -> &mut Self {
        self.name(name);
        self.op("Do")
    }

    pub fn begin_marked_content(&mut self, tag: &str) -> &mut Self {
        self.name(tag);
        self.op("BMC")
    }

    pub fn end_marked_content(&mut self) -> &mut Self {
        self.op("EMC")
    }

    /// Append pre-built operators verbatim, e.g. a field's default appearance string
    pub fn raw(&mut self, operators: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(operators);
        self.buf.push(b'\n');
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_sequence() {
        let mut c = ContentComposer::new();
        c.save_state()
            .set_fill_color(1.0, 1.0, 0.6)
            .rect(10.0, 20.0, 30.5, 40.0)
            .fill()
            .restore_state();
        assert_eq!(
            String::from_utf8(c.into_bytes()).unwrap(),
            "q\n1 1 0.6 rg\n10 20 30.5 40 re\nf\nQ\n"
        );
    }

    #[test]
    fn test_text_is_escaped() {
        let mut c = ContentComposer::new();
        c.begin_text()
            .set_font("F1", 14.0)
            .show_text(b"a (b)")
            .end_text();
        assert_eq!(
            String::from_utf8(c.into_bytes()).unwrap(),
            "BT\n/F1 14 Tf\n(a \\(b\\)) Tj\nET\n"
        );
    }

    #[test]
    fn test_rotation_matrix() {
        let mut c = ContentComposer::new();
        c.rotate_degrees(90.0);
        assert_eq!(String::from_utf8(c.into_bytes()).unwrap(), "0 1 -1 0 0 0 cm\n");
    }
}
