//! Marker enrichment: canonical Arabic text, translation text, and reciter
//! labels. Runs after alignment; purely in-memory lookups.

use std::collections::HashMap;

use crate::corpus::CorpusIndex;
use crate::domain::{Marker, ReciterWindow};

/// Translation lookup keyed by `(surah_number, ayah_number)`.
pub type TranslationLookup = HashMap<(u16, u32), String>;

/// Fill `arabic_text` from the corpus and `english_text` from a translation
/// lookup. Missing entries leave the fields unset.
pub fn enrich_marker_texts(
    markers: &mut [Marker],
    corpus: &CorpusIndex,
    translations: &TranslationLookup,
) {
    for marker in markers.iter_mut() {
        if let Some(entry) = corpus.entry_by_id(marker.surah_number, marker.ayah) {
            marker.arabic_text = Some(entry.text.clone());
        }
        if let Some(text) = translations.get(&(marker.surah_number, marker.ayah)) {
            marker.english_text = Some(text.clone());
        }
    }
}

/// Tag each marker with the reciter of the window containing its start time.
pub fn assign_reciters_to_markers(markers: &mut [Marker], windows: &[ReciterWindow]) {
    if windows.is_empty() {
        return;
    }
    for marker in markers.iter_mut() {
        let assigned = windows
            .iter()
            .find(|window| window.start <= marker.start_time && marker.start_time < window.end)
            .and_then(|window| window.reciter.clone());
        marker.reciter = Some(assigned.unwrap_or_else(|| "Unknown".to_string()));
    }
}

/// Parse a translation payload into a `(surah, ayah) -> text` lookup.
///
/// Accepts both the bare `{ "surahs": [...] }` layout and API responses
/// wrapped in a `data` object; ayah numbers may be spelled `numberInSurah`
/// or `number`.
pub fn parse_translation_payload(payload: &serde_json::Value) -> TranslationLookup {
    let root = payload.get("data").unwrap_or(payload);
    let mut lookup = TranslationLookup::new();

    let Some(surahs) = root.get("surahs").and_then(|value| value.as_array()) else {
        return lookup;
    };
    for surah in surahs {
        let Some(surah_number) = surah
            .get("number")
            .and_then(|value| value.as_u64())
            .filter(|number| (1..=114).contains(number))
        else {
            continue;
        };
        let Some(ayahs) = surah.get("ayahs").and_then(|value| value.as_array()) else {
            continue;
        };
        for ayah in ayahs {
            let number = ayah
                .get("numberInSurah")
                .or_else(|| ayah.get("number"))
                .and_then(|value| value.as_u64());
            let text = ayah
                .get("text")
                .and_then(|value| value.as_str())
                .map(str::trim);
            if let (Some(number), Some(text)) = (number, text) {
                if number >= 1 && !text.is_empty() {
                    lookup.insert((surah_number as u16, number as u32), text.to_string());
                }
            }
        }
    }

    lookup
}
