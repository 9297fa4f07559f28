//! Canonical Quran corpus loading and indexing.
//!
//! The corpus arrives as `{ "surahs": [ { number, name, ayahs: [...] } ] }`
//! in canonical order. Each ayah becomes an [`AyahEntry`] with one or more
//! match forms; entries get a linear index across surahs which the matcher
//! uses as its progression pointer.

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::{AlignmentError, AyahEntry};
use crate::normalize::normalize_arabic;

/// Disjoined-letter openers and their spoken-letter renditions. Reciters say
/// the letter names, so ayah 1 of these surahs carries both forms.
const MUQATTAAT_SPOKEN_FORMS: [(&str, &str); 14] = [
    ("الم", "الف لام ميم"),
    ("المص", "الف لام ميم صاد"),
    ("المر", "الف لام ميم را"),
    ("الر", "الف لام را"),
    ("كهيعص", "كاف ها يا عين صاد"),
    ("طه", "طا ها"),
    ("طسم", "طا سين ميم"),
    ("طس", "طا سين"),
    ("يس", "يا سين"),
    ("ص", "صاد"),
    ("حم", "حا ميم"),
    ("عسق", "عين سين قاف"),
    ("ق", "قاف"),
    ("ن", "نون"),
];

/// (juz, start_surah, start_ayah), scanned in reverse for lookup.
const JUZ_STARTS: [(u8, u16, u32); 30] = [
    (1, 1, 1),
    (2, 2, 142),
    (3, 2, 253),
    (4, 3, 93),
    (5, 4, 24),
    (6, 4, 148),
    (7, 5, 82),
    (8, 6, 111),
    (9, 7, 88),
    (10, 8, 41),
    (11, 9, 93),
    (12, 11, 6),
    (13, 12, 53),
    (14, 15, 1),
    (15, 17, 1),
    (16, 18, 75),
    (17, 21, 1),
    (18, 23, 1),
    (19, 25, 21),
    (20, 27, 56),
    (21, 29, 46),
    (22, 33, 31),
    (23, 36, 28),
    (24, 39, 32),
    (25, 41, 47),
    (26, 46, 1),
    (27, 51, 31),
    (28, 58, 1),
    (29, 67, 1),
    (30, 78, 1),
];

/// Juz for a given ayah via the fixed start table.
pub fn juz_for_ayah(surah_number: u16, ayah_number: u32) -> u8 {
    for &(juz, start_surah, start_ayah) in JUZ_STARTS.iter().rev() {
        if surah_number > start_surah {
            return juz;
        }
        if surah_number == start_surah && ayah_number >= start_ayah {
            return juz;
        }
    }
    1
}

/// Al-Fatiha is recited between cycles and never becomes a marker target.
/// The name check covers the common transliterations and the Arabic name.
pub fn is_excluded_surah(surah_name: &str) -> bool {
    let folded: String = surah_name
        .to_lowercase()
        .replace(['-', ' '], "");
    folded.contains("fatiha") || folded.contains("faatiha") || surah_name.contains("فاتحة")
}

#[derive(Debug, Deserialize)]
pub struct CorpusDocument {
    pub surahs: Vec<SurahDocument>,
}

#[derive(Debug, Deserialize)]
pub struct SurahDocument {
    pub number: i64,
    #[serde(default)]
    pub name: String,
    pub ayahs: Vec<AyahDocument>,
}

#[derive(Debug, Deserialize)]
pub struct AyahDocument {
    pub number: i64,
    pub text: String,
}

/// Loaded corpus with linear ordering and identity lookups.
#[derive(Debug)]
pub struct CorpusIndex {
    entries: Vec<AyahEntry>,
    by_key: HashMap<(u16, u32), usize>,
    surah_totals: HashMap<u16, u32>,
    surah_names: HashMap<u16, String>,
    matchable: Vec<bool>,
}

impl CorpusIndex {
    /// Parse and index a corpus JSON string.
    pub fn from_json_str(payload: &str) -> Result<Self, AlignmentError> {
        let document: CorpusDocument = serde_json::from_str(payload)
            .map_err(|err| AlignmentError::InvalidPayload(err.to_string()))?;
        Self::from_document(document)
    }

    /// Validate and index a parsed corpus document.
    pub fn from_document(document: CorpusDocument) -> Result<Self, AlignmentError> {
        if document.surahs.is_empty() {
            return Err(AlignmentError::MissingSurahs);
        }

        let mut entries: Vec<AyahEntry> = Vec::new();
        let mut by_key = HashMap::new();
        let mut surah_totals: HashMap<u16, u32> = HashMap::new();
        let mut surah_names = HashMap::new();

        for surah in document.surahs {
            if !(1..=114).contains(&surah.number) {
                return Err(AlignmentError::SurahNumberOutOfRange(surah.number));
            }
            let surah_number = surah.number as u16;
            if surah.ayahs.is_empty() {
                return Err(AlignmentError::EmptySurah {
                    surah: surah_number,
                });
            }
            surah_names.insert(surah_number, surah.name.clone());

            for ayah in surah.ayahs {
                if ayah.number < 1 {
                    return Err(AlignmentError::AyahNumberOutOfRange {
                        surah: surah_number,
                        ayah: ayah.number,
                    });
                }
                let ayah_number = ayah.number as u32;
                let text = ayah.text.trim().to_string();
                let normalized = normalize_arabic(&text);
                if normalized.is_empty() {
                    continue;
                }

                let total = surah_totals.entry(surah_number).or_insert(0);
                if ayah_number > *total {
                    *total = ayah_number;
                }

                let entry = AyahEntry {
                    surah_number,
                    surah: surah.name.clone(),
                    ayah: ayah_number,
                    match_forms: build_match_forms(ayah_number, &normalized),
                    text,
                    normalized,
                };
                by_key.insert((surah_number, ayah_number), entries.len());
                entries.push(entry);
            }
        }

        let matchable = entries
            .iter()
            .map(|entry| !is_excluded_surah(&entry.surah))
            .collect();

        Ok(Self {
            entries,
            by_key,
            surah_totals,
            surah_names,
            matchable,
        })
    }

    pub fn entries(&self) -> &[AyahEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, linear_index: usize) -> Option<&AyahEntry> {
        self.entries.get(linear_index)
    }

    /// Linear position of `(surah, ayah)` in corpus order.
    pub fn linear_index(&self, surah_number: u16, ayah_number: u32) -> Option<usize> {
        self.by_key.get(&(surah_number, ayah_number)).copied()
    }

    pub fn entry_by_id(&self, surah_number: u16, ayah_number: u32) -> Option<&AyahEntry> {
        self.linear_index(surah_number, ayah_number)
            .and_then(|index| self.entries.get(index))
    }

    /// Highest ayah number seen for a surah.
    pub fn surah_total(&self, surah_number: u16) -> Option<u32> {
        self.surah_totals.get(&surah_number).copied()
    }

    pub fn surah_name(&self, surah_number: u16) -> Option<&str> {
        self.surah_names.get(&surah_number).map(String::as_str)
    }

    /// Surah number for a display name, if loaded.
    pub fn surah_number_by_name(&self, name: &str) -> Option<u16> {
        self.surah_names
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(number, _)| *number)
    }

    /// False for entries of excluded surahs (Fatiha).
    pub fn is_matchable(&self, linear_index: usize) -> bool {
        self.matchable.get(linear_index).copied().unwrap_or(false)
    }
}

fn build_match_forms(ayah_number: u32, normalized_text: &str) -> Vec<String> {
    let mut forms = vec![normalized_text.to_string()];
    if ayah_number != 1 {
        return forms;
    }
    let compact: String = normalized_text.split_whitespace().collect();
    if let Some((_, spoken)) = MUQATTAAT_SPOKEN_FORMS
        .iter()
        .find(|(letters, _)| *letters == compact)
    {
        let variant = normalize_arabic(spoken);
        if !variant.is_empty() && !forms.contains(&variant) {
            forms.push(variant);
        }
    }
    forms
}
