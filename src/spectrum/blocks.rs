use tracing::info;

use crate::config::Tuning;
use crate::errors::EngineError;
use crate::source::ArtifactIntervals;

/// One contiguous analysis window of `block_size` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Position in the block sequence.
    pub index: usize,
    /// First sample (absolute recording position).
    pub from: usize,
    /// Last sample (absolute recording position).
    pub to: usize,
    /// False when the block overlaps any artifact interval.
    pub good: bool,
}

/// The full block grid of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSchedule {
    /// Blocks in time order.
    pub blocks: Vec<Block>,
    /// Step between consecutive block starts, in samples.
    pub step: usize,
    /// Block length in samples.
    pub block_size: usize,
    /// Count of blocks not excluded by artifacts.
    pub good_count: usize,
}

/// Tile `[window_from, window_to]` with blocks and classify each against the
/// artifact intervals.
///
/// The step is `block_size * (1 - overlap)`, collapsing to a single sample
/// above the configured overlap threshold; blocks never read past the window
/// end. Bad blocks keep their output slot (zero-filled) but are excluded
/// from the good count.
pub fn schedule_blocks(
    window_from: usize,
    window_to: usize,
    block_size: usize,
    overlap: f64,
    artifacts: &ArtifactIntervals,
    tuning: &Tuning,
) -> Result<BlockSchedule, EngineError> {
    let samples = window_to - window_from + 1;
    if block_size == 0 {
        return Err(EngineError::InvalidBlockSize { block_size });
    }
    if samples < block_size {
        return Err(EngineError::NoBlocks {
            samples,
            block_size,
        });
    }
    let step = if overlap > tuning.single_step_overlap {
        1
    } else {
        ((block_size as f64) * (1.0 - overlap)).round().max(1.0) as usize
    };
    let count = (samples - block_size) / step + 1;

    let mut blocks = Vec::with_capacity(count);
    let mut good_count = 0usize;
    for index in 0..count {
        let from = window_from + index * step;
        let to = from + block_size - 1;
        let good = !artifacts.overlaps(from, to);
        if good {
            good_count += 1;
        }
        blocks.push(Block {
            index,
            from,
            to,
            good,
        });
    }
    info!(
        "Scheduled {count} blocks of {block_size} samples, step {step}, {good_count} good"
    );
    Ok(BlockSchedule {
        blocks,
        step,
        block_size,
        good_count,
    })
}
