use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::region::{normalize, Region, Sentence, SentenceId};

/// Position of one region inside the sentence collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionRef {
    pub sentence: usize,
    pub region: usize,
}

/// Per-page lookup of sentence regions, built once per sentence collection.
#[derive(Debug, Clone)]
pub struct RegionIndex {
    sentences: Arc<[Sentence]>,
    by_page: HashMap<u32, Vec<RegionRef>>,
    positions: HashMap<SentenceId, usize>,
    anchors: HashMap<SentenceId, RegionRef>,
    region_count: usize,
}

impl Default for RegionIndex {
    fn default() -> Self {
        Self::build(Vec::new())
    }
}

impl RegionIndex {
    pub fn build(sentences: impl Into<Arc<[Sentence]>>) -> Self {
        let sentences = sentences.into();
        let mut by_page: HashMap<u32, Vec<RegionRef>> = HashMap::new();
        let mut positions = HashMap::with_capacity(sentences.len());
        let mut anchors = HashMap::new();
        let mut region_count = 0;

        for (sentence_idx, sentence) in sentences.iter().enumerate() {
            if positions.contains_key(&sentence.id) {
                warn!(id = sentence.id, "duplicate sentence id; keeping the first entry");
            } else {
                positions.insert(sentence.id, sentence_idx);
            }
            for (region_idx, region) in sentence.regions.iter().enumerate() {
                let slot = RegionRef {
                    sentence: sentence_idx,
                    region: region_idx,
                };
                by_page.entry(region.page).or_default().push(slot);
                if positions.get(&sentence.id) == Some(&sentence_idx)
                    && !anchors.contains_key(&sentence.id)
                    && normalize(region).is_ok()
                {
                    anchors.insert(sentence.id, slot);
                }
                region_count += 1;
            }
        }

        Self {
            sentences,
            by_page,
            positions,
            anchors,
            region_count,
        }
    }

    pub fn regions_on_page(&self, page: u32) -> PageRegions<'_> {
        let slots = self.by_page.get(&page).map(Vec::as_slice).unwrap_or(&[]);
        PageRegions {
            sentences: &self.sentences,
            slots: slots.iter(),
        }
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn sentence(&self, id: SentenceId) -> Option<&Sentence> {
        self.positions.get(&id).map(|&idx| &self.sentences[idx])
    }

    pub fn position(&self, id: SentenceId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn contains(&self, id: SentenceId) -> bool {
        self.positions.contains_key(&id)
    }

    /// First region of the sentence, in sentence order, that can be drawn.
    pub fn anchor_of(&self, id: SentenceId) -> Option<RegionRef> {
        self.anchors.get(&id).copied()
    }

    pub fn region(&self, slot: RegionRef) -> Option<&Region> {
        self.sentences
            .get(slot.sentence)
            .and_then(|sentence| sentence.regions.get(slot.region))
    }

    pub fn region_count(&self) -> usize {
        self.region_count
    }

    pub fn sentence_count(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Neighbouring sentence id in collection order, used for next/previous
    /// navigation.
    pub fn offset_from(&self, id: SentenceId, delta: isize) -> Option<SentenceId> {
        let current = self.position(id)? as isize;
        let target = current.checked_add(delta)?;
        if target < 0 {
            return None;
        }
        self.sentences.get(target as usize).map(|s| s.id)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageEntry<'a> {
    pub slot: RegionRef,
    pub sentence: &'a Sentence,
    pub region: &'a Region,
}

pub struct PageRegions<'a> {
    sentences: &'a [Sentence],
    slots: std::slice::Iter<'a, RegionRef>,
}

impl<'a> Iterator for PageRegions<'a> {
    type Item = PageEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = *self.slots.next()?;
        let sentence = &self.sentences[slot.sentence];
        Some(PageEntry {
            slot,
            sentence,
            region: &sentence.regions[slot.region],
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.slots.size_hint()
    }
}

impl ExactSizeIterator for PageRegions<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(page: u32, x: f32) -> Region {
        Region {
            page,
            x,
            y: 10.0,
            width: 5.0,
            height: 5.0,
            page_width: 100.0,
            page_height: 100.0,
        }
    }

    fn collection() -> Vec<Sentence> {
        vec![
            Sentence::new(10, "first", vec![region(1, 1.0), region(1, 2.0), region(2, 3.0)]),
            Sentence::new(11, "empty", Vec::new()),
            Sentence::new(12, "second", vec![region(2, 4.0), region(1, 5.0)]),
            Sentence::new(13, "third", vec![region(4, 6.0)]),
        ]
    }

    #[test]
    fn page_queries_preserve_sentence_then_region_order() {
        let index = RegionIndex::build(collection());
        let page_one: Vec<_> = index
            .regions_on_page(1)
            .map(|entry| (entry.sentence.id, entry.region.x))
            .collect();
        assert_eq!(page_one, vec![(10, 1.0), (10, 2.0), (12, 5.0)]);

        let page_two: Vec<_> = index
            .regions_on_page(2)
            .map(|entry| (entry.sentence.id, entry.region.x))
            .collect();
        assert_eq!(page_two, vec![(10, 3.0), (12, 4.0)]);
    }

    #[test]
    fn page_counts_sum_to_total_regions() {
        let sentences = collection();
        let total: usize = sentences.iter().map(|s| s.regions.len()).sum();
        let index = RegionIndex::build(sentences);
        let summed: usize = (0..=10).map(|page| index.regions_on_page(page).len()).sum();
        assert_eq!(summed, total);
        assert_eq!(index.region_count(), total);
    }

    #[test]
    fn missing_pages_and_empty_input_answer_empty() {
        let index = RegionIndex::build(collection());
        assert_eq!(index.regions_on_page(3).count(), 0);

        let empty = RegionIndex::build(Vec::new());
        assert!(empty.is_empty());
        for page in 0..5 {
            assert_eq!(empty.regions_on_page(page).len(), 0);
        }
    }

    #[test]
    fn build_leaves_input_untouched() {
        let sentences: Arc<[Sentence]> = collection().into();
        let before = sentences.to_vec();
        let index = RegionIndex::build(Arc::clone(&sentences));
        assert_eq!(&*sentences, before.as_slice());
        assert_eq!(index.sentence_count(), 4);
    }

    #[test]
    fn anchor_skips_undrawable_regions() {
        let mut broken = region(1, 0.0);
        broken.page_width = 0.0;
        let index = RegionIndex::build(vec![
            Sentence::new(1, "a", vec![broken, region(3, 7.0)]),
            Sentence::new(2, "b", Vec::new()),
        ]);
        assert_eq!(
            index.anchor_of(1),
            Some(RegionRef {
                sentence: 0,
                region: 1
            })
        );
        assert_eq!(index.anchor_of(2), None);
        assert_eq!(index.anchor_of(99), None);
    }

    #[test]
    fn sentence_lookup_and_neighbours() {
        let index = RegionIndex::build(collection());
        assert_eq!(index.sentence(12).map(|s| &*s.text), Some("second"));
        assert!(index.contains(11));
        assert!(!index.contains(42));
        assert_eq!(index.offset_from(10, 1), Some(11));
        assert_eq!(index.offset_from(13, 1), None);
        assert_eq!(index.offset_from(10, -1), None);
        assert_eq!(index.offset_from(12, -2), Some(10));
    }
}
