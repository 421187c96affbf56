//! In-memory page cache sitting in front of [`storage::PageManager`].
//!
//! Two replacement policies are supported, selected once at
//! `BufferPool::open` time: LRU reorders a page to the most-recently-used
//! end on every hit, FIFO never reorders and evicts strictly in allocation
//! order. Both share the same `HashMap` + `VecDeque` bookkeeping; the only
//! difference is whether a hit touches the queue.

use std::collections::VecDeque;

use hashbrown::HashMap;

use common::{DbResult, ExecutionStats, PageId, ReplacementPolicy};
use storage::{Page, PageManager};

pub struct BufferPool {
    pager: PageManager,
    capacity: usize,
    policy: ReplacementPolicy,
    cache: HashMap<PageId, Page>,
    /// Queue order: front is the next eviction victim. For LRU this is
    /// least-recently-used first; for FIFO this is insertion order.
    order: VecDeque<PageId>,
    stats: ExecutionStats,
}

impl BufferPool {
    /// `capacity` of 0 disables the eviction cap entirely: the cache is then
    /// free to grow without bound.
    pub fn open(pager: PageManager, capacity: usize, policy: ReplacementPolicy) -> Self {
        Self {
            pager,
            capacity,
            policy,
            cache: HashMap::new(),
            order: VecDeque::new(),
            stats: ExecutionStats::default(),
        }
    }

    pub fn stats(&self) -> ExecutionStats {
        self.stats
    }

    /// Allocates a brand-new page through the underlying page manager and
    /// seats it in the cache, evicting if necessary.
    pub fn allocate_page(&mut self) -> DbResult<PageId> {
        let page = self.pager.allocate_page()?;
        let id = page.id;
        self.seat(id, page)?;
        Ok(id)
    }

    /// Returns a reference to the page, fetching it from disk on a miss.
    pub fn fetch(&mut self, id: PageId) -> DbResult<&Page> {
        if self.cache.contains_key(&id) {
            self.stats.buffer_hits += 1;
            self.touch(id);
        } else {
            self.stats.buffer_misses += 1;
            self.stats.pages_read += 1;
            let page = self.pager.read_page(id)?;
            self.seat(id, page)?;
        }
        Ok(self.cache.get(&id).expect("just seated"))
    }

    /// Returns a mutable reference for in-place edits. Callers that mutate
    /// fields directly are responsible for calling `page.mark_dirty()`
    /// (insert/update/delete helpers in the heap crate always do).
    pub fn fetch_mut(&mut self, id: PageId) -> DbResult<&mut Page> {
        self.fetch(id)?;
        Ok(self.cache.get_mut(&id).expect("just fetched"))
    }

    /// Inserts a page the caller just constructed in memory (e.g. a freshly
    /// allocated header page) without going through the page manager's own
    /// `allocate_page`, used when the heap layer needs to pre-populate a
    /// page's contents before the first flush.
    pub fn put(&mut self, page: Page) -> DbResult<()> {
        let id = page.id;
        self.seat(id, page)
    }

    fn seat(&mut self, id: PageId, page: Page) -> DbResult<()> {
        if self.capacity > 0 && !self.cache.contains_key(&id) && self.cache.len() >= self.capacity {
            self.evict_one()?;
        }
        self.cache.insert(id, page);
        if !self.order.contains(&id) {
            self.order.push_back(id);
        }
        Ok(())
    }

    fn touch(&mut self, id: PageId) {
        if self.policy == ReplacementPolicy::Lru {
            if let Some(pos) = self.order.iter().position(|&x| x == id) {
                self.order.remove(pos);
                self.order.push_back(id);
            }
        }
    }

    fn evict_one(&mut self) -> DbResult<()> {
        let Some(victim) = self.order.pop_front() else {
            return Ok(());
        };
        if let Some(page) = self.cache.remove(&victim) {
            if page.dirty {
                self.pager.write_page(&page)?;
                self.stats.pages_written += 1;
            }
        }
        self.stats.evictions += 1;
        log::trace!("evicted page {} ({:?})", victim.0, self.policy);
        Ok(())
    }

    pub fn flush(&mut self, id: PageId) -> DbResult<()> {
        if let Some(page) = self.cache.get_mut(&id) {
            if page.dirty {
                self.pager.write_page(page)?;
                self.stats.pages_written += 1;
                page.dirty = false;
            }
        }
        Ok(())
    }

    pub fn flush_all(&mut self) -> DbResult<()> {
        let ids: Vec<PageId> = self.cache.keys().copied().collect();
        for id in ids {
            self.flush(id)?;
        }
        Ok(())
    }

    /// Drops `id` from the cache (discarding any dirty content unwritten)
    /// and deletes its backing page file, used when a table is dropped and
    /// its pages are reclaimed for good.
    pub fn free(&mut self, id: PageId) -> DbResult<()> {
        self.cache.remove(&id);
        if let Some(pos) = self.order.iter().position(|&x| x == id) {
            self.order.remove(pos);
        }
        self.pager.free(id)
    }

    pub fn page_manager(&self) -> &PageManager {
        &self.pager
    }

    pub fn cached_page_ids(&self) -> Vec<PageId> {
        self.order.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn pool(capacity: usize, policy: ReplacementPolicy) -> (BufferPool, TempDir) {
        let dir = tempdir().unwrap();
        let pager = PageManager::open(dir.path()).unwrap();
        (BufferPool::open(pager, capacity, policy), dir)
    }

    #[test]
    fn lru_eviction_matches_reference_trace() {
        let (mut bp, _dir) = pool(3, ReplacementPolicy::Lru);
        for _ in 0..4 {
            bp.allocate_page().unwrap();
        }
        // Pages 0,1,2,3 allocated in order; capacity 3 means page 0 was
        // evicted already. Access sequence from the spec: 0,1,0,2,3.
        // Page 0 is already gone, so re-fetching it re-seats and evicts
        // whichever is currently least-recently-used (page 1).
        bp.fetch(PageId(0)).unwrap();
        bp.fetch(PageId(1)).unwrap();
        bp.fetch(PageId(0)).unwrap();
        bp.fetch(PageId(2)).unwrap();
        bp.fetch(PageId(3)).unwrap();

        let mut cached: Vec<u64> = bp.cached_page_ids().iter().map(|p| p.0).collect();
        cached.sort();
        assert_eq!(cached, vec![0, 2, 3]);
    }

    #[test]
    fn fifo_does_not_reorder_on_hit() {
        let (mut bp, _dir) = pool(2, ReplacementPolicy::Fifo);
        bp.allocate_page().unwrap(); // page 0
        bp.allocate_page().unwrap(); // page 1
        bp.fetch(PageId(0)).unwrap(); // hit, FIFO: no reorder
        bp.allocate_page().unwrap(); // page 2, must evict page 0 (oldest), not page 1

        let mut cached: Vec<u64> = bp.cached_page_ids().iter().map(|p| p.0).collect();
        cached.sort();
        assert_eq!(cached, vec![1, 2]);
    }

    #[test]
    fn zero_capacity_disables_eviction() {
        let (mut bp, _dir) = pool(0, ReplacementPolicy::Lru);
        for _ in 0..10 {
            bp.allocate_page().unwrap();
        }
        assert_eq!(bp.cached_page_ids().len(), 10);
        assert_eq!(bp.stats().evictions, 0);
    }

    #[test]
    fn free_drops_the_page_from_cache_and_disk() {
        let (mut bp, _dir) = pool(4, ReplacementPolicy::Lru);
        let id = bp.allocate_page().unwrap();
        bp.free(id).unwrap();
        assert!(!bp.cached_page_ids().contains(&id));
        assert!(!bp.page_manager().page_exists(id));
    }

    #[test]
    fn dirty_victim_is_flushed_before_eviction() {
        let (mut bp, _dir) = pool(1, ReplacementPolicy::Lru);
        bp.allocate_page().unwrap();
        {
            let page = bp.fetch_mut(PageId(0)).unwrap();
            page.set_i32(0, 99);
        }
        bp.allocate_page().unwrap(); // evicts page 0, which is dirty
        assert_eq!(bp.stats().pages_written, 1);

        let reread = bp.page_manager().read_page(PageId(0)).unwrap();
        assert_eq!(reread.get_i32(0), 99);
    }
}
