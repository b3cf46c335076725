use serde::{Deserialize, Serialize};

/// A pixel coordinate on the page/screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// Absolute pixel box in the source screenshot. Always `x1 <= x2`, `y1 <= y2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "BoxRepr")]
pub struct BoundingBox {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

#[derive(Deserialize)]
struct BoxRepr {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl From<BoxRepr> for BoundingBox {
    fn from(r: BoxRepr) -> Self {
        BoundingBox::new(r.x1, r.y1, r.x2, r.y2)
    }
}

impl BoundingBox {
    /// Swapped corners are reordered.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn x1(&self) -> f64 {
        self.x1
    }

    pub fn y1(&self) -> f64 {
        self.y1
    }

    pub fn x2(&self) -> f64 {
        self.x2
    }

    pub fn y2(&self) -> f64 {
        self.y2
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x1 + (self.x2 - self.x1) / 2.0,
            self.y1 + (self.y2 - self.y1) / 2.0,
        )
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x1 && p.x <= self.x2 && p.y >= self.y1 && p.y <= self.y2
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Detector output before enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub bounding_box: BoundingBox,
    pub semantic_name: String,
    pub class_name: String,
    pub confidence: f32,
}

/// One detected and optionally enriched UI element.
///
/// Serialized as `{box, name, class, confidence, text}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    #[serde(rename = "box")]
    bounding_box: BoundingBox,
    #[serde(rename = "name")]
    semantic_name: String,
    #[serde(rename = "class")]
    class_name: String,
    confidence: f32,
    #[serde(rename = "text", default)]
    text_lines: Vec<String>,
}

impl ElementRecord {
    pub fn new(
        bounding_box: BoundingBox,
        semantic_name: impl Into<String>,
        class_name: impl Into<String>,
        confidence: f32,
        text_lines: Vec<String>,
    ) -> Self {
        Self {
            bounding_box,
            semantic_name: semantic_name.into(),
            class_name: class_name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            text_lines,
        }
    }

    pub fn from_detection(det: RawDetection, text_lines: Vec<String>) -> Self {
        Self::new(
            det.bounding_box,
            det.semantic_name,
            det.class_name,
            det.confidence,
            text_lines,
        )
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    pub fn semantic_name(&self) -> &str {
        &self.semantic_name
    }

    /// Alias of [`semantic_name`](Self::semantic_name).
    pub fn name(&self) -> &str {
        &self.semantic_name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn text_lines(&self) -> &[String] {
        &self.text_lines
    }

    /// Lines joined without separator, the way a user reads a short label.
    pub fn text(&self) -> String {
        self.text_lines.concat()
    }

    /// True if any line contains `needle`.
    pub fn text_contains(&self, needle: &str) -> bool {
        self.text_lines.iter().any(|l| l.contains(needle))
    }

    pub fn center(&self) -> Point {
        self.bounding_box.center()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapped_corners_are_normalized() {
        let b = BoundingBox::new(110.0, 40.0, 10.0, 10.0);
        assert_eq!((b.x1(), b.y1(), b.x2(), b.y2()), (10.0, 10.0, 110.0, 40.0));
    }

    #[test]
    fn center_matches_midpoint_formula() {
        let b = BoundingBox::new(10.0, 10.0, 110.0, 40.0);
        assert_eq!(b.center(), Point::new(60.0, 25.0));
        assert!(b.contains(b.center()));
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-9);
        assert_eq!(a.iou(&b), 0.0);
        let degenerate = BoundingBox::new(5.0, 5.0, 5.0, 5.0);
        assert_eq!(degenerate.iou(&degenerate), 0.0);
    }

    #[test]
    fn record_uses_documented_field_names() {
        let record = ElementRecord::new(
            BoundingBox::new(10.0, 10.0, 110.0, 40.0),
            "button",
            "0",
            0.91,
            vec!["登录".into()],
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["box"]["x1"], 10.0);
        assert_eq!(value["box"]["y2"], 40.0);
        assert_eq!(value["name"], "button");
        assert_eq!(value["class"], "0");
        assert_eq!(value["text"][0], "登录");
    }

    #[test]
    fn deserialization_normalizes_box_and_defaults_text() {
        let raw = r#"{"box":{"x1":50,"y1":40,"x2":10,"y2":0},"name":"a","class":"a","confidence":0.5}"#;
        let record: ElementRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.bounding_box().x1(), 10.0);
        assert_eq!(record.bounding_box().y2(), 40.0);
        assert!(record.text_lines().is_empty());
    }

    #[test]
    fn confidence_is_clamped() {
        let record = ElementRecord::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), "a", "a", 1.7, vec![]);
        assert_eq!(record.confidence(), 1.0);
    }
}
