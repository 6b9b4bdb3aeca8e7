use super::result::Position;

/// Classify the horizontal position of a box relative to the frame center.
///
/// The center band is `frame_width * center_threshold` pixels on either side
/// of the midpoint; anything inside it reads as "in front".
pub fn classify_position(x1: i32, x2: i32, frame_width: u32, center_threshold: f64) -> Position {
    let object_center = (x1 + x2) as f64 / 2.0;
    let frame_center = frame_width as f64 / 2.0;
    let threshold_px = frame_width as f64 * center_threshold;

    if object_center < frame_center - threshold_px {
        Position::Left
    } else if object_center > frame_center + threshold_px {
        Position::Right
    } else {
        Position::Front
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midpoint_is_front() {
        assert_eq!(classify_position(310, 330, 640, 0.2), Position::Front);
    }

    #[test]
    fn left_and_right_are_symmetric() {
        // 640 wide, threshold 0.2 -> front band is [192, 448]
        assert_eq!(classify_position(100, 200, 640, 0.2), Position::Left);
        assert_eq!(classify_position(440, 540, 640, 0.2), Position::Right);
    }

    #[test]
    fn band_edges_are_front() {
        // centers at exactly 192 and 448 stay in the front band
        assert_eq!(classify_position(182, 202, 640, 0.2), Position::Front);
        assert_eq!(classify_position(438, 458, 640, 0.2), Position::Front);
        assert_eq!(classify_position(181, 202, 640, 0.2), Position::Left);
        assert_eq!(classify_position(438, 459, 640, 0.2), Position::Right);
    }

    #[test]
    fn scenario_person_at_150_is_left() {
        // 640x480 frame, box (100,100)-(200,300): center 150 < 320 - 128
        assert_eq!(classify_position(100, 200, 640, 0.2), Position::Left);
    }
}
