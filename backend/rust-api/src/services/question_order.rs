use rand::seq::SliceRandom;
use rand::Rng;

/// Display order for a new session's questions, as global indices into the
/// quiz's flattened question list.
///
/// OMR sheets keep the printed order. Otherwise every question set is split
/// into blocks of `subset_size` and each block is shuffled on its own, so a
/// paginated fetch of one block always returns the same questions.
pub fn build_question_order<R: Rng + ?Sized>(
    question_set_sizes: &[usize],
    subset_size: usize,
    omr_mode: bool,
    rng: &mut R,
) -> Vec<usize> {
    let total: usize = question_set_sizes.iter().sum();
    let mut order: Vec<usize> = (0..total).collect();
    if omr_mode {
        return order;
    }

    let block = subset_size.max(1);
    let mut offset = 0;
    for &size in question_set_sizes {
        for chunk in order[offset..offset + size].chunks_mut(block) {
            chunk.shuffle(rng);
        }
        offset += size;
    }

    order
}
