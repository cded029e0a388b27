// Output record JSON contract
// Field names, order and value encodings consumed by the front end and batch files

use serde_json::{json, Value};
use solarscan_core::record::RecordContext;
use solarscan_core::{PredictionRecord, SampleId, TileSource};

const FIELDS: [&str; 12] = [
    "sample_id",
    "lat",
    "lon",
    "has_solar",
    "confidence",
    "pv_area_sqm_est",
    "buffer_radius_sqft",
    "qc_status",
    "bbox_or_mask",
    "image_metadata",
    "tile_image",
    "overlay_image",
];

fn ctx(sample_id: SampleId) -> RecordContext {
    RecordContext {
        sample_id,
        lat: 28.61394,
        lon: 77.20902,
        buffer_radius_sqft: 1200,
        source: Some(TileSource::GoogleTile),
        capture_date: Some("2026-10-16".to_string()),
        tile_image: Some("batch_outputs/tiles/7.jpg".to_string()),
        overlay_image: Some("batch_outputs/overlays/7_overlay.jpg".to_string()),
    }
}

#[test]
fn test_field_order_is_stable() {
    let record = PredictionRecord::detected(ctx(SampleId::Number(7)), [1.0, 2.0, 3.0, 4.0], 0.5, 2.0, 0.35);
    let text = serde_json::to_string(&record).unwrap();

    let positions: Vec<usize> = FIELDS
        .iter()
        .map(|f| text.find(&format!("\"{}\":", f)).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", text);

    let value: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value.as_object().unwrap().len(), FIELDS.len());
}

#[test]
fn test_detected_record_values() {
    let record = PredictionRecord::detected(
        ctx(SampleId::Number(7)),
        [12.0, 30.5, 58.0, 77.25],
        0.876543,
        41.23456,
        0.35,
    );
    let value = serde_json::to_value(&record).unwrap();

    assert_eq!(
        value,
        json!({
            "sample_id": 7,
            "lat": 28.61394,
            "lon": 77.20902,
            "has_solar": true,
            "confidence": 0.8765,
            "pv_area_sqm_est": 41.235,
            "buffer_radius_sqft": 1200,
            "qc_status": "VERIFIABLE",
            "bbox_or_mask": {"bbox": [12.0, 30.5, 58.0, 77.25]},
            "image_metadata": {"source": "GOOGLE_TILE", "capture_date": "2026-10-16"},
            "tile_image": "batch_outputs/tiles/7.jpg",
            "overlay_image": "batch_outputs/overlays/7_overlay.jpg"
        })
    );
}

#[test]
fn test_text_sample_id_round_trip() {
    let record = PredictionRecord::unverifiable(ctx(SampleId::Text("house-9".to_string())));
    let text = serde_json::to_string(&record).unwrap();
    assert!(text.contains("\"sample_id\":\"house-9\""));

    let back: PredictionRecord = serde_json::from_str(&text).unwrap();
    assert_eq!(back, record);
}

#[test]
fn test_unverifiable_record_values() {
    let record = PredictionRecord::unverifiable(ctx(SampleId::Number(3)));
    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["has_solar"], false);
    assert_eq!(value["confidence"], 0.0);
    assert_eq!(value["pv_area_sqm_est"], 0.0);
    assert_eq!(value["qc_status"], "NOT_VERIFIABLE");
    assert_eq!(value["bbox_or_mask"], Value::Null);
}
