//! Run parameters shared by controller, broker and workers

use serde::{Deserialize, Serialize};

/// How to run the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Turns to compute
    pub turns: u64,
    /// Grid width in cells
    pub image_width: usize,
    /// Grid height in rows (a strip's local height in worker requests)
    pub image_height: usize,
}

impl Params {
    /// Create run parameters
    pub fn new(image_width: usize, image_height: usize, turns: u64) -> Self {
        Self {
            turns,
            image_width,
            image_height,
        }
    }

    /// Same parameters with the height replaced by a strip's local height
    pub fn with_local_height(self, local_height: usize) -> Self {
        Self {
            image_height: local_height,
            ..self
        }
    }

    /// Input image stem, `<width>x<height>`
    pub fn input_name(&self) -> String {
        format!("{}x{}", self.image_width, self.image_height)
    }

    /// Output image stem after `turn` turns, `<width>x<height>x<turn>`
    pub fn output_name(&self, turn: u64) -> String {
        format!("{}x{}x{turn}", self.image_width, self.image_height)
    }
}
