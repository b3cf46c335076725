pub mod annotator;
pub mod crop;
pub mod pipeline;
pub mod types;
pub mod yolo_detector;
