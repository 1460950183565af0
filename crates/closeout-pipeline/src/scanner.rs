//! Bounded paging over a shrinking candidate set.
//!
//! Delivery scans page over rows whose sent flag is unset. Handled
//! candidates leave the candidate set between pages, so a naive
//! `offset += limit` would skip the rows that slid into the handled rows'
//! positions. [`PageCursor`] advances the offset only past candidates that
//! remain unhandled (deferred for retry on a later invocation), which
//! guarantees:
//!
//! - no candidate is skipped within one invocation;
//! - memory stays bounded by the page size;
//! - the loop terminates: every non-empty page either shrinks the candidate
//!   set or moves the offset forward.
//!
//! For a stable set of `N` candidates and page size `k`, a scan is exactly
//! `ceil(N/k)` non-empty pages followed by the empty page that ends it.

use crate::store::Page;

/// Paging cursor for one candidate scan.
#[derive(Debug, Clone, Copy)]
pub struct PageCursor {
    limit: u32,
    offset: u32,
}

impl PageCursor {
    /// Creates a cursor with the given page size.
    #[must_use]
    pub const fn new(limit: u32) -> Self {
        Self { limit, offset: 0 }
    }

    /// The page to fetch next.
    #[must_use]
    pub const fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }

    /// Advances past the candidates of the page just processed.
    ///
    /// `handled` is the number of candidates that left the candidate set
    /// (flag committed, or found already flagged); the rest are still
    /// present and the offset moves past them.
    pub fn advance(&mut self, fetched: usize, handled: usize) {
        let remaining = fetched.saturating_sub(handled);
        self.offset = self
            .offset
            .saturating_add(u32::try_from(remaining).unwrap_or(u32::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Simulates a scan over `n` candidates where `handle` decides whether a
    /// candidate leaves the set, returning the number of non-empty pages.
    fn simulate(n: usize, limit: u32, mut handle: impl FnMut(usize) -> bool) -> (usize, Vec<usize>) {
        let mut set: Vec<usize> = (0..n).collect();
        let mut cursor = PageCursor::new(limit);
        let mut pages = 0;

        loop {
            let page = cursor.page();
            let fetched: Vec<usize> = set
                .iter()
                .copied()
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .collect();
            if fetched.is_empty() {
                return (pages, set);
            }
            pages += 1;

            let mut handled = 0;
            for candidate in &fetched {
                if handle(*candidate) {
                    set.retain(|c| c != candidate);
                    handled += 1;
                }
            }
            cursor.advance(fetched.len(), handled);
        }
    }

    #[test]
    fn exhausts_in_ceil_n_over_k_pages_when_all_handled() {
        let (pages, rest) = simulate(10, 3, |_| true);
        assert_eq!(pages, 4); // ceil(10/3)
        assert!(rest.is_empty());
    }

    #[test]
    fn exact_multiple_of_page_size() {
        let (pages, rest) = simulate(9, 3, |_| true);
        assert_eq!(pages, 3);
        assert!(rest.is_empty());
    }

    #[test]
    fn empty_set_terminates_immediately() {
        let (pages, _) = simulate(0, 3, |_| true);
        assert_eq!(pages, 0);
    }

    #[test]
    fn deferred_candidates_are_not_rescanned_forever() {
        // Nothing ever leaves the set; the cursor must still terminate
        // after walking every candidate once.
        let mut seen = Vec::new();
        let (pages, rest) = simulate(7, 3, |c| {
            seen.push(c);
            false
        });
        assert_eq!(pages, 3);
        assert_eq!(rest.len(), 7);
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn mixed_outcomes_visit_every_candidate_exactly_once() {
        // Even candidates are handled, odd ones defer.
        let mut seen = Vec::new();
        let (_, rest) = simulate(10, 4, |c| {
            seen.push(c);
            c % 2 == 0
        });
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        assert_eq!(rest, vec![1, 3, 5, 7, 9]);
    }
}
