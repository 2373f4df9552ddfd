use serde::{Deserialize, Serialize};

use super::QueueItem;

/// Completion of a run over its selected items
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub completed_steps: usize,
    pub total_steps: usize,
    /// Rounded percentage, 0..=100
    pub percent: u8,
}

impl Progress {
    /// Sums each item's executed steps over `items × step_count`
    pub fn compute<'a, I>(items: I, step_count: usize) -> Self
    where
        I: IntoIterator<Item = &'a QueueItem>,
    {
        let mut selected = 0usize;
        let mut completed_steps = 0usize;

        for item in items {
            selected += 1;
            completed_steps += item.progress_steps(step_count);
        }

        Self::from_counts(completed_steps, selected * step_count)
    }

    pub fn from_counts(completed_steps: usize, total_steps: usize) -> Self {
        let percent = if total_steps == 0 {
            0
        } else {
            ((completed_steps as f64 / total_steps as f64) * 100.0)
                .round()
                .clamp(0.0, 100.0) as u8
        };

        Self {
            completed_steps,
            total_steps,
            percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_of_one_item_in_two_is_a_quarter() {
        let mut running = QueueItem::new("a");
        running.advance_to(2);
        let waiting = QueueItem::new("b");

        let progress = Progress::compute([&running, &waiting], 4);

        assert_eq!(progress.percent, 25);
        assert_eq!(progress.completed_steps, 2);
        assert_eq!(progress.total_steps, 8);
    }

    #[test]
    fn test_completed_items_count_every_step() {
        let mut done = QueueItem::new("a");
        done.complete("out");

        assert_eq!(Progress::compute([&done], 3).percent, 100);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(Progress::from_counts(1, 3).percent, 33);
        assert_eq!(Progress::from_counts(2, 3).percent, 67);
    }

    #[test]
    fn test_empty_selection() {
        let progress = Progress::compute(std::iter::empty(), 4);
        assert_eq!(progress.percent, 0);
        assert_eq!(progress.total_steps, 0);
    }
}
