use serde::{Deserialize, Serialize};

use crate::types::TrajectoryPoint;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StagnationReport {
    /// Not enough trajectory yet; callers treat this as not stagnant.
    Undefined,
    Stagnant { average_distance: f64 },
    Moving { average_distance: f64 },
}

impl StagnationReport {
    pub fn is_stagnant(&self) -> bool {
        matches!(self, StagnationReport::Stagnant { .. })
    }
}

/// Euclidean distance between two embeddings. Mismatched or empty vectors
/// yield `None` so the caller can decide how to degrade.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum();

    let distance = sum.sqrt();
    if distance.is_finite() {
        Some(distance)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct StagnationDetector {
    window: usize,
    movement_threshold: f64,
}

impl StagnationDetector {
    pub fn new(window: usize, movement_threshold: f64) -> Self {
        Self {
            window: window.max(2),
            movement_threshold,
        }
    }

    /// Looks at the last `window` trajectory points and averages the distance
    /// between consecutive embeddings.
    pub fn assess(&self, trajectory: &[TrajectoryPoint]) -> StagnationReport {
        if trajectory.len() < self.window {
            return StagnationReport::Undefined;
        }

        let recent = &trajectory[trajectory.len() - self.window..];
        let distances: Vec<f64> = recent
            .windows(2)
            .map(|pair| {
                euclidean_distance(&pair[0].embedding, &pair[1].embedding).unwrap_or_else(|| {
                    log::debug!(
                        "Malformed embedding between cycles {} and {}; counting as no movement",
                        pair[0].cycle_number,
                        pair[1].cycle_number
                    );
                    0.0
                })
            })
            .collect();

        let average_distance = distances.iter().sum::<f64>() / distances.len() as f64;
        if average_distance < self.movement_threshold {
            StagnationReport::Stagnant { average_distance }
        } else {
            StagnationReport::Moving { average_distance }
        }
    }
}

impl Default for StagnationDetector {
    fn default() -> Self {
        Self::new(5, 0.1)
    }
}
