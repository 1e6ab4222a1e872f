//! Member names mentioned in questions.
//!
//! A question that names a member ("When is Layla planning her trip to
//! London?") is answered only from that member's records. Names are matched
//! on lowercased alphanumeric words: first the full name as a word sequence,
//! then single name words when exactly one member carries them.

use std::collections::{HashMap, HashSet};

use member_qa_embeddings::is_stopword;
use tracing::debug;

use crate::record::{RecordId, RecordStore};

/// Name words shorter than this never match on their own.
const MIN_NAME_WORD_CHARS: usize = 3;

/// Words that ask about a member without naming a topic.
const FILLER_WORDS: &[&str] = &[
    "anything", "ask", "asked", "asking", "asks", "last", "latest", "member", "mention",
    "mentioned", "message", "messages", "need", "needed", "needs", "recent", "recently",
    "request", "requested", "requests", "said", "say", "says", "send", "sent", "something",
    "tell", "told", "want", "wanted", "wants", "write", "wrote",
];

/// Lowercased alphanumeric words of `text`.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug)]
struct Member {
    identity: String,
    words: Vec<String>,

    /// Corpus order.
    records: Vec<RecordId>,
}

/// Members of one corpus and the records each of them wrote.
#[derive(Debug, Default)]
pub struct MemberDirectory {
    members: Vec<Member>,
}

/// Members named by a question.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberMention {
    /// Display names of the matched members.
    pub identities: Vec<String>,

    /// Their records, in corpus order.
    pub records: Vec<RecordId>,

    /// The question with the matched names removed.
    pub remainder: String,

    /// Share of the member's name words found in the question; 1.0 for a
    /// full-name match.
    pub confidence: f32,
}

impl MemberMention {
    /// Whether anything beyond the name is asked about.
    pub fn has_topic(&self) -> bool {
        words(&self.remainder)
            .iter()
            .any(|w| !is_stopword(w) && !FILLER_WORDS.contains(&w.as_str()))
    }
}

impl MemberDirectory {
    /// Group records by member, keyed on the normalized name.
    pub fn build(store: &RecordStore) -> Self {
        let mut members: Vec<Member> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();

        for record in store.iter() {
            let name_words = words(&record.identity);
            if name_words.is_empty() {
                continue;
            }
            let key = name_words.join(" ");
            match by_name.get(&key) {
                Some(&i) => members[i].records.push(record.id),
                None => {
                    by_name.insert(key, members.len());
                    members.push(Member {
                        identity: record.identity.clone(),
                        words: name_words,
                        records: vec![record.id],
                    });
                }
            }
        }

        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Find the members a question is about.
    ///
    /// Full names win. Otherwise a single name word (at least three
    /// characters, not a stopword) counts only when no other member shares
    /// it; an ambiguous word restricts nothing.
    pub fn find(&self, question: &str) -> Option<MemberMention> {
        let question_words = words(question);
        if question_words.is_empty() {
            return None;
        }

        let padded = format!(" {} ", question_words.join(" "));
        let full: Vec<&Member> = self
            .members
            .iter()
            .filter(|m| m.words.len() > 1 || Self::distinctive(&m.words[0]))
            .filter(|m| padded.contains(&format!(" {} ", m.words.join(" "))))
            .collect();
        if !full.is_empty() {
            return Some(Self::mention(&full, &question_words, 1.0));
        }

        let asked: HashSet<&str> = question_words
            .iter()
            .map(String::as_str)
            .filter(|w| !is_stopword(w))
            .collect();
        let mut matched = self.members.iter().filter(|m| {
            m.words
                .iter()
                .any(|w| Self::distinctive(w) && asked.contains(w.as_str()))
        });

        let member = matched.next()?;
        if let Some(other) = matched.next() {
            debug!(
                "Question names both {} and {}; not restricting by member",
                member.identity, other.identity
            );
            return None;
        }

        let hits = member
            .words
            .iter()
            .filter(|w| asked.contains(w.as_str()))
            .count();
        let confidence = hits as f32 / member.words.len() as f32;
        Some(Self::mention(&[member], &question_words, confidence))
    }

    fn distinctive(word: &str) -> bool {
        word.chars().count() >= MIN_NAME_WORD_CHARS && !is_stopword(word)
    }

    fn mention(members: &[&Member], question_words: &[String], confidence: f32) -> MemberMention {
        let name_words: HashSet<&str> = members
            .iter()
            .flat_map(|m| m.words.iter().map(String::as_str))
            .collect();

        let mut records: Vec<RecordId> = members
            .iter()
            .flat_map(|m| m.records.iter().copied())
            .collect();
        records.sort_unstable();

        let remainder = question_words
            .iter()
            .map(String::as_str)
            .filter(|w| !name_words.contains(w))
            .collect::<Vec<_>>()
            .join(" ");

        MemberMention {
            identities: members.iter().map(|m| m.identity.clone()).collect(),
            records,
            remainder,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::clean;
    use crate::record::RawRecord;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;

    fn directory(authors: &[&str]) -> MemberDirectory {
        let ts = DateTime::parse_from_rfc3339("2025-01-02T03:04:05+00:00").unwrap();
        let store = RecordStore::build(
            authors
                .iter()
                .enumerate()
                .map(|(i, name)| RawRecord::new(*name, ts, format!("message {i}"))),
            clean,
        );
        MemberDirectory::build(&store)
    }

    fn positions(mention: &MemberMention) -> Vec<usize> {
        mention.records.iter().map(|id| id.position()).collect()
    }

    #[test]
    fn test_records_grouped_by_normalized_name() {
        let members = directory(&["Layla Kawaguchi", "Armand Dupont", "layla  kawaguchi"]);
        assert_eq!(members.len(), 2);

        let mention = members.find("Where is Layla Kawaguchi going?").unwrap();
        assert_eq!(positions(&mention), vec![0, 2]);
        assert_eq!(mention.identities, vec!["Layla Kawaguchi"]);
        assert_eq!(mention.confidence, 1.0);
        assert_eq!(mention.remainder, "where is going");
    }

    #[test]
    fn test_full_name_with_punctuation() {
        let members = directory(&["Sophia Al-Farsi", "Fatima El Tahir"]);
        let mention = members.find("What did sophia al farsi's assistant book?").unwrap();
        assert_eq!(mention.identities, vec!["Sophia Al-Farsi"]);
        assert_eq!(mention.remainder, "what did s assistant book");
    }

    #[test]
    fn test_unique_first_name() {
        let members = directory(&["Layla Kawaguchi", "Armand Dupont"]);
        let mention = members
            .find("When is Layla planning her trip to London?")
            .unwrap();
        assert_eq!(mention.identities, vec!["Layla Kawaguchi"]);
        assert_eq!(mention.confidence, 0.5);
        assert!(mention.has_topic());
    }

    #[test]
    fn test_shared_first_name_is_ambiguous() {
        let members = directory(&["Layla Kawaguchi", "Layla Haddad"]);
        assert_eq!(members.find("What did Layla order?"), None);

        let mention = members.find("What did Layla Haddad order?").unwrap();
        assert_eq!(mention.identities, vec!["Layla Haddad"]);
    }

    #[test]
    fn test_short_name_words_do_not_match_alone() {
        let members = directory(&["Sophia Al-Farsi"]);
        assert_eq!(members.find("Is the al fresco table free?"), None);
    }

    #[test]
    fn test_single_letter_member_never_matches() {
        let members = directory(&["A", "Lily O'Sullivan"]);
        assert_eq!(members.find("Is a table free tonight?"), None);
    }

    #[test]
    fn test_no_name_mentioned() {
        let members = directory(&["Fatima El Tahir"]);
        assert_eq!(members.find("Who is looking for an antiques dealer?"), None);
        assert_eq!(members.find(""), None);
    }

    #[test]
    fn test_name_only_question_has_no_topic() {
        let members = directory(&["Armand Dupont"]);
        let mention = members.find("What did Armand Dupont ask for?").unwrap();
        assert!(!mention.has_topic());

        let mention = members.find("What did Armand Dupont ask about the opera?").unwrap();
        assert!(mention.has_topic());
    }
}
