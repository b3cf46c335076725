mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{detection, png, pool, ScriptedDetector};
use vision_dom::executor::recording::{Command, RecordingExecutor};
use vision_dom::executor::{Key, KeyChord, MouseButton};
use vision_dom::ocr::BackendKind;
use vision_dom::query::predicate::{name_is, text_contains, PredicateExt};
use vision_dom::{ElementSet, ExecutorContext, InspectOptions, InspectionPipeline, Point};

fn search_page() -> (Vec<vision_dom::perception::types::RawDetection>, Vec<((u32, u32), Vec<String>)>) {
    let detections = vec![
        detection(0.0, 0.0, 60.0, 24.0, "channel-link", 0.88),
        detection(70.0, 0.0, 150.0, 24.0, "channel-link", 0.86),
        detection(460.0, 30.0, 540.0, 50.0, "input", 0.93),
        detection(560.0, 30.0, 620.0, 50.0, "button", 0.91),
    ];
    let labels = vec![
        ((60, 24), vec!["动画".to_string()]),
        ((80, 24), vec!["鬼畜".to_string()]),
        ((60, 20), vec!["搜索".to_string()]),
    ];
    (detections, labels)
}

#[tokio::test]
async fn fallback_backend_reads_text_when_primary_is_missing() {
    let (detections, labels) = search_page();
    let pipeline = InspectionPipeline::new(Box::new(ScriptedDetector(detections)), pool(labels));
    assert_eq!(pipeline.pool().warm_up().unwrap(), BackendKind::Ocrs);

    let set = pipeline
        .inspect(&png(640, 80), InspectOptions::default())
        .await
        .unwrap();
    assert_eq!(set.len(), 4);
    let ghost = set.filter(text_contains("鬼畜"));
    assert_eq!(ghost.len(), 1);
    assert_eq!(ghost.first().unwrap().semantic_name(), "channel-link");
}

#[tokio::test]
async fn inspect_filter_then_type_into_the_search_box() {
    let (detections, labels) = search_page();
    let recorder = Arc::new(RecordingExecutor::with_pages(2));
    let ctx = Arc::new(ExecutorContext::new(recorder.clone()).with_settle_interval(Duration::from_millis(1)));
    let pipeline = InspectionPipeline::new(Box::new(ScriptedDetector(detections)), pool(labels))
        .with_workers(2)
        .with_executor(ctx);

    let set = pipeline
        .inspect(&png(640, 80), InspectOptions::default().page_index(1))
        .await
        .unwrap();

    let typed = set
        .filter(name_is("input"))
        .input("UI自动化", true, None)
        .await
        .unwrap();
    assert_eq!(typed, Some(Point::new(500.0, 40.0)));

    let search = name_is("button").and(text_contains("搜索"));
    set.click(Some(&search), false).await.unwrap();

    assert_eq!(
        recorder.commands(),
        vec![
            Command::Click { page: 1, at: Point::new(500.0, 40.0), button: MouseButton::Left, click_count: 1 },
            Command::PressKeys { page: 1, chords: vec![KeyChord::select_all(), KeyChord::key(Key::Delete)] },
            Command::InsertText { page: 1, text: "UI自动化".into() },
            Command::Click { page: 1, at: Point::new(590.0, 40.0), button: MouseButton::Left, click_count: 1 },
        ]
    );
}

#[tokio::test]
async fn records_survive_a_json_round_trip() {
    let (detections, labels) = search_page();
    let pipeline = InspectionPipeline::new(Box::new(ScriptedDetector(detections)), pool(labels));
    let set = pipeline
        .inspect(&png(640, 80), InspectOptions::default())
        .await
        .unwrap();

    let json = set.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let first = &value.as_array().unwrap()[0];
    for key in ["box", "name", "class", "confidence", "text"] {
        assert!(first.get(key).is_some(), "missing {key}");
    }

    let back = ElementSet::from_json(&json, 0).unwrap();
    assert_eq!(back.records(), set.records());
}

#[tokio::test]
async fn search_predicate_narrows_the_result() {
    let (detections, labels) = search_page();
    let pipeline = InspectionPipeline::new(Box::new(ScriptedDetector(detections)), pool(labels));
    let set = pipeline
        .inspect(
            &png(640, 80),
            InspectOptions::default().search(name_is("channel-link").and(text_contains("动画"))),
        )
        .await
        .unwrap();
    assert_eq!(set.texts(), vec![vec!["动画".to_string()]]);
}
