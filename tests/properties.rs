mod common;

use common::{DocumentBuilder, PAGE_HEIGHT, PAGE_WIDTH};
use delver_sync::text::splits_word;
use delver_sync::{locate, repair, score, to_regions, MatchTier};
use proptest::prelude::*;

fn sentence() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-z]{1,8}", 4..30)
}

fn paragraphs() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(
        proptest::collection::vec("[a-z]{1,8}", 1..15).prop_map(|w| w.join(" ")),
        1..12,
    )
}

/// Byte offset of word `i` in `words.join(" ")`.
fn word_offset(words: &[String], i: usize) -> usize {
    words[..i].iter().map(|w| w.len() + 1).sum()
}

proptest! {
    #[test]
    fn repaired_spans_never_split_words(
        words in sentence(),
        a in 0usize..400,
        b in 0usize..400,
        target_words in 1usize..6,
    ) {
        let hay = words.join(" ");
        let start = a.min(b) % (hay.len() + 1);
        let end = (a.max(b) % (hay.len() + 1)).max(start);
        let target = words[..target_words.min(words.len())].join(" ");

        let (o, l) = repair(&hay, (start, end - start), &target);
        prop_assert!(o + l <= hay.len());
        prop_assert!(!splits_word(&hay, o, o + l), "{:?} in {:?}", &hay[o..o + l], hay);
    }

    #[test]
    fn exact_word_aligned_substrings_are_kept(
        words in sentence(),
        i in 0usize..30,
        n in 1usize..6,
    ) {
        let hay = words.join(" ");
        let i = i % words.len();
        let j = (i + n).min(words.len());
        let needle = words[i..j].join(" ");
        let offset = word_offset(&words, i);

        let found = locate(&hay, &needle, Some(offset)).unwrap().unwrap();
        prop_assert_eq!(found.tier, MatchTier::Exact);
        prop_assert_eq!(found.offset, offset);

        let repaired = repair(&hay, (offset, needle.len()), &needle);
        prop_assert_eq!(repaired, (offset, needle.len()));
        prop_assert_eq!(score(&hay[offset..offset + needle.len()], &needle), 1.0);
    }

    #[test]
    fn index_entries_are_monotonic(paras in paragraphs()) {
        let builder = paras
            .iter()
            .fold(DocumentBuilder::new("v1"), |b, p| b.paragraph(p));
        let index = builder.index();

        prop_assert_eq!(index.entries().len() + index.unindexed().len(), paras.len());
        for pair in index.entries().windows(2) {
            prop_assert!(pair[0].text_start <= pair[1].text_start);
            prop_assert!(pair[0].text_end <= pair[1].text_end);
            prop_assert!(pair[0].text_end <= pair[1].text_start);
        }
    }

    #[test]
    fn regions_stay_inside_their_pages(
        paras in paragraphs(),
        a in 0usize..2000,
        len in 0usize..300,
    ) {
        let builder = paras
            .iter()
            .enumerate()
            .fold(DocumentBuilder::new("v1"), |b, (i, p)| {
                let b = if i > 0 && i % 4 == 0 { b.page_break() } else { b };
                b.paragraph(p)
            });
        let index = builder.index();
        let text_len = index.source().len();
        let offset = a % (text_len + 1);
        let length = len.min(text_len - offset);

        let regions = to_regions((offset, length), &index);
        let mut last_page = 0;
        for region in &regions {
            prop_assert!(region.page > last_page);
            last_page = region.page;
            for rect in &region.rects {
                prop_assert!(rect.contained_in(PAGE_WIDTH, PAGE_HEIGHT), "{:?}", rect);
            }
        }
    }
}
