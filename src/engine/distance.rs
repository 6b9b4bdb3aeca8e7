use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::result::Distance;

/// The medium band starts at this fraction of a class's close limit.
const MEDIUM_FACTOR: f64 = 0.33;

/// Classify object distance from the box-area / frame-area ratio.
///
/// Each class has a calibrated close limit (a bus must fill half the frame to
/// be close, a cup only a few percent); unknown classes use the configured
/// default. Fails when the frame area is not positive.
pub fn classify_distance(
    class_name: &str,
    box_area: i64,
    frame_area: i64,
    class_thresholds: &HashMap<String, f64>,
    default_threshold: f64,
) -> Result<Distance> {
    if frame_area <= 0 {
        return Err(anyhow!(
            "frame area must be positive, got {} for '{}'",
            frame_area,
            class_name
        ));
    }

    let area_ratio = box_area as f64 / frame_area as f64;
    let close_limit = class_thresholds
        .get(class_name)
        .copied()
        .unwrap_or(default_threshold);
    let medium_limit = close_limit * MEDIUM_FACTOR;

    if area_ratio > close_limit {
        Ok(Distance::Close)
    } else if area_ratio > medium_limit {
        Ok(Distance::Medium)
    } else {
        Ok(Distance::Far)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> HashMap<String, f64> {
        let mut map = HashMap::new();
        map.insert("person".to_string(), 0.15);
        map.insert("bus".to_string(), 0.50);
        map
    }

    #[test]
    fn buckets_are_monotonic_in_area_ratio() {
        let map = thresholds();
        let frame_area = 307_200i64; // 640x480
        // person: close limit 0.15, medium limit 0.0495
        let far = (frame_area as f64 * 0.04) as i64;
        let medium = (frame_area as f64 * 0.10) as i64;
        let close = (frame_area as f64 * 0.20) as i64;
        assert_eq!(
            classify_distance("person", far, frame_area, &map, 0.15).unwrap(),
            Distance::Far
        );
        assert_eq!(
            classify_distance("person", medium, frame_area, &map, 0.15).unwrap(),
            Distance::Medium
        );
        assert_eq!(
            classify_distance("person", close, frame_area, &map, 0.15).unwrap(),
            Distance::Close
        );
    }

    #[test]
    fn scenario_person_box_is_medium() {
        // box (100,100)-(200,300) in a 640x480 frame: ratio ~0.0651
        let map = thresholds();
        assert_eq!(
            classify_distance("person", 20_000, 307_200, &map, 0.15).unwrap(),
            Distance::Medium
        );
    }

    #[test]
    fn per_class_limit_beats_default() {
        let map = thresholds();
        // a bus covering 30% of the frame is still medium (limit 0.50)
        let frame_area = 307_200i64;
        let area = (frame_area as f64 * 0.30) as i64;
        assert_eq!(
            classify_distance("bus", area, frame_area, &map, 0.15).unwrap(),
            Distance::Medium
        );
        // an unknown class at the same ratio uses the 0.15 default and is close
        assert_eq!(
            classify_distance("umbrella", area, frame_area, &map, 0.15).unwrap(),
            Distance::Close
        );
    }

    #[test]
    fn degenerate_frame_area_fails() {
        let map = thresholds();
        assert!(classify_distance("person", 100, 0, &map, 0.15).is_err());
        assert!(classify_distance("person", 100, -10, &map, 0.15).is_err());
    }
}
