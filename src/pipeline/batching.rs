use crate::database::models::NewBatch;
use crate::subtitle_processor::Cue;

// @module: Splitting a cue sequence into fixed-size batches

/// Split cues into consecutive windows of `batch_size`, numbered from 1.
///
/// The last window holds the remainder. A zero size is treated as one so
/// every cue still lands in exactly one batch.
pub fn partition(cues: &[Cue], batch_size: usize) -> Vec<NewBatch> {
    let size = batch_size.max(1);

    cues.chunks(size)
        .enumerate()
        .map(|(i, chunk)| NewBatch {
            batch_number: i as u32 + 1,
            entries: chunk.to_vec(),
        })
        .collect()
}
