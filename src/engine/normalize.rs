use crate::detect::RawDetection;

/// Drop raw detections below the confidence threshold and cap the survivors
/// at `max_detections`.
///
/// When the cap applies, the kept subset is the top-K by confidence but is
/// emitted in ascending-confidence order; without truncation the caller's
/// order is preserved. Downstream stages do not re-sort.
pub(crate) fn filter_detections(
    raw: &[RawDetection],
    confidence_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    let kept: Vec<RawDetection> = raw
        .iter()
        .filter(|det| det.confidence >= confidence_threshold)
        .copied()
        .collect();

    if kept.len() <= max_detections {
        return kept;
    }

    let mut order: Vec<usize> = (0..kept.len()).collect();
    order.sort_by(|&a, &b| {
        kept[a]
            .confidence
            .partial_cmp(&kept[b].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order[kept.len() - max_detections..]
        .iter()
        .map(|&idx| kept[idx])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(confidence: f32) -> RawDetection {
        RawDetection {
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
            confidence,
            class_id: 0,
        }
    }

    #[test]
    fn drops_low_confidence() {
        let raw = vec![det(0.9), det(0.4), det(0.5)];
        let kept = filter_detections(&raw, 0.5, 8);
        let confs: Vec<f32> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(confs, vec![0.9, 0.5]);
    }

    #[test]
    fn preserves_input_order_without_truncation() {
        let raw = vec![det(0.6), det(0.9), det(0.7)];
        let kept = filter_detections(&raw, 0.5, 8);
        let confs: Vec<f32> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(confs, vec![0.6, 0.9, 0.7]);
    }

    #[test]
    fn truncation_keeps_top_k_in_ascending_order() {
        let raw = vec![det(0.7), det(0.95), det(0.55), det(0.8), det(0.6)];
        let kept = filter_detections(&raw, 0.5, 3);
        let confs: Vec<f32> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(confs, vec![0.7, 0.8, 0.95]);
    }

    #[test]
    fn never_exceeds_max_detections() {
        let raw: Vec<RawDetection> = (0..50).map(|i| det(0.5 + (i as f32) * 0.005)).collect();
        for max in [1usize, 3, 8, 49, 50, 51] {
            let kept = filter_detections(&raw, 0.5, max);
            assert!(kept.len() <= max);
        }
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(filter_detections(&[], 0.5, 8).is_empty());
    }
}
