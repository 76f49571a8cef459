use crate::models::Page;

pub fn total_pages(total_count: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    total_count.div_ceil(page_size).max(1)
}

pub fn paginate<T: Clone>(items: &[T], page_size: usize, page_number: usize) -> Page<T> {
    let size = page_size.max(1);
    let number = page_number.max(1);
    let start = (number - 1).saturating_mul(size).min(items.len());
    let end = start.saturating_add(size).min(items.len());

    Page {
        number,
        size,
        total_count: items.len(),
        total_pages: total_pages(items.len(), size),
        items: items[start..end].to_vec(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    current: usize,
    page_size: usize,
    total_count: usize,
}

impl Pager {
    pub fn new(page_size: usize) -> Self {
        Self {
            current: 1,
            page_size: page_size.max(1),
            total_count: 0,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_pages(&self) -> usize {
        total_pages(self.total_count, self.page_size)
    }

    pub fn set_total(&mut self, total_count: usize) {
        self.total_count = total_count;
    }

    pub fn reset(&mut self) {
        self.current = 1;
    }

    pub fn can_prev(&self) -> bool {
        self.current > 1
    }

    pub fn can_next(&self) -> bool {
        self.current < self.total_pages()
    }

    pub fn prev(&mut self) -> bool {
        if !self.can_prev() {
            return false;
        }
        self.current -= 1;
        true
    }

    pub fn next(&mut self) -> bool {
        if !self.can_next() {
            return false;
        }
        self.current += 1;
        true
    }

    /// Jumps to `page`; values below 1 clamp to 1. Pages past the end are
    /// allowed and render empty.
    pub fn go_to(&mut self, page: usize) {
        self.current = page.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forty_five_items_in_pages_of_twenty() {
        let items: Vec<usize> = (0..45).collect();
        assert_eq!(total_pages(45, 20), 3);
        assert_eq!(paginate(&items, 20, 1).items.len(), 20);
        assert_eq!(paginate(&items, 20, 3).items, (40..45).collect::<Vec<_>>());
        let past_end = paginate(&items, 20, 4);
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total_pages, 3);
    }

    #[test]
    fn total_pages_bounds() {
        assert_eq!(total_pages(0, 20), 1);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
        for size in 1..8 {
            for count in 0..40 {
                let pages = total_pages(count, size);
                assert_eq!(pages, std::cmp::max(1, (count + size - 1) / size));
                let items: Vec<usize> = (0..count).collect();
                assert!(paginate(&items, size, pages).items.len() <= count);
                assert!(paginate(&items, size, pages + 1).items.is_empty());
            }
        }
    }

    #[test]
    fn empty_sequence_has_one_empty_page() {
        let page = paginate::<u8>(&[], 10, 1);
        assert_eq!(page.total_pages, 1);
        assert!(page.items.is_empty());
    }

    #[test]
    fn navigation_is_guarded_at_both_ends() {
        let mut pager = Pager::new(20);
        pager.set_total(45);
        assert!(!pager.can_prev());
        assert!(!pager.prev());
        assert_eq!(pager.current(), 1);

        assert!(pager.next());
        assert!(pager.next());
        assert_eq!(pager.current(), 3);
        assert!(!pager.can_next());
        assert!(!pager.next());
        assert_eq!(pager.current(), 3);

        assert!(pager.prev());
        assert_eq!(pager.current(), 2);
    }

    #[test]
    fn no_navigation_when_nothing_to_show() {
        let mut pager = Pager::new(20);
        pager.set_total(0);
        assert!(!pager.can_next());
        assert!(!pager.can_prev());
    }
}
