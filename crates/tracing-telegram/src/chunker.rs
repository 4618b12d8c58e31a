// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Packs payloads into size-bounded chat messages.
//!
//! Payloads are concatenated in order, each followed by the separator, until
//! the next one would push the chunk over `max_size`. A payload is never
//! split: one that is larger than `max_size` on its own becomes a chunk by
//! itself, so the bound holds for every chunk holding two or more payloads.

/// Lazy iterator over the chunks of a payload sequence.
///
/// Consumes its input; once exhausted it stays exhausted.
#[derive(Debug)]
pub struct Chunks<'a, I> {
    payloads: I,
    separator: &'a str,
    max_size: usize,
    pending: String,
}

impl<'a, I, S> Chunks<'a, I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    pub fn new(
        payloads: impl IntoIterator<IntoIter = I>,
        separator: &'a str,
        max_size: usize,
    ) -> Self {
        Chunks {
            payloads: payloads.into_iter(),
            separator,
            max_size,
            pending: String::new(),
        }
    }
}

impl<I, S> Iterator for Chunks<'_, I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        for payload in self.payloads.by_ref() {
            let payload = payload.as_ref();
            let mut ready = None;

            if !self.pending.is_empty()
                && self.pending.len() + payload.len() + self.separator.len() > self.max_size
            {
                ready = Some(std::mem::take(&mut self.pending));
            }

            self.pending.push_str(payload);
            self.pending.push_str(self.separator);

            if ready.is_some() {
                return ready;
            }
        }

        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{MESSAGE_MAX_SIZE, MESSAGE_SEPARATOR};
    use proptest::prelude::*;

    fn pack(payloads: &[&str], separator: &str, max_size: usize) -> Vec<String> {
        Chunks::new(payloads.iter(), separator, max_size).collect()
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let payloads: Vec<String> = Vec::new();
        assert_eq!(
            Chunks::new(payloads, MESSAGE_SEPARATOR, MESSAGE_MAX_SIZE).count(),
            0
        );
    }

    #[test]
    fn test_single_chunk_with_default_limits() {
        let result: Vec<String> =
            Chunks::new(["msg1", "msg2"], MESSAGE_SEPARATOR, MESSAGE_MAX_SIZE).collect();
        assert_eq!(result, vec!["msg1\n---\nmsg2\n---\n"]);
    }

    #[test]
    fn test_fixed_size_payloads_pack_in_pairs() {
        let payload = "x".repeat(100);
        let payloads: Vec<&str> = std::iter::repeat(payload.as_str()).take(5).collect();

        let result = pack(&payloads, "", 250);

        let sizes: Vec<usize> = result.iter().map(String::len).collect();
        assert_eq!(sizes, vec![200, 200, 100]);
    }

    #[test]
    fn test_payload_exactly_max_size_forms_own_chunk() {
        let exact = "a".repeat(250);
        let result = pack(&["b", exact.as_str(), "c"], "", 250);

        assert_eq!(result, vec!["b".to_string(), exact, "c".to_string()]);
    }

    #[test]
    fn test_oversized_payload_is_not_split() {
        let big = "z".repeat(300);
        let result = pack(&[big.as_str()], "\n", 250);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].len(), 301);
    }

    #[test]
    fn test_separator_counts_toward_limit() {
        // "aaaa|" (5) + "bbbb|" (5) = 10 fits; a third one would be 15
        let result = pack(&["aaaa", "bbbb", "cccc"], "|", 10);
        assert_eq!(result, vec!["aaaa|bbbb|", "cccc|"]);
    }

    #[test]
    fn test_exhausted_iterator_stays_exhausted() {
        let mut iter = Chunks::new(["one", "two"], "\n", 4);
        assert_eq!(iter.next().as_deref(), Some("one\n"));
        assert_eq!(iter.next().as_deref(), Some("two\n"));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
    }

    proptest! {
        #[test]
        fn prop_chunks_preserve_payloads_in_order(
            payloads in proptest::collection::vec("[a-z]{0,40}", 0..50),
            max_size in 1usize..200,
        ) {
            let joined: String = Chunks::new(payloads.iter(), ";", max_size).collect();
            let expected: String = payloads.iter().map(|p| format!("{p};")).collect();
            prop_assert_eq!(joined, expected);
        }

        #[test]
        fn prop_multi_payload_chunks_respect_limit(
            payloads in proptest::collection::vec("[a-z]{1,40}", 0..50),
            max_size in 1usize..200,
        ) {
            for chunk in Chunks::new(payloads.iter(), ";", max_size) {
                if chunk.matches(';').count() > 1 {
                    prop_assert!(chunk.len() <= max_size);
                }
            }
        }
    }
}
