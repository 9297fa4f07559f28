//! Shared corpus and transcript builders for integration tests.

use taraweeh_core::{CorpusIndex, TranscriptSegment, TranscriptWord};

pub const CORPUS_JSON: &str = r#"{
  "surahs": [
    {"number": 1, "name": "Al-Fatiha", "ayahs": [
      {"number": 1, "text": "بسم الله الرحمن الرحيم"},
      {"number": 2, "text": "الحمد لله رب العالمين"},
      {"number": 3, "text": "الرحمن الرحيم"},
      {"number": 4, "text": "مالك يوم الدين"},
      {"number": 5, "text": "اياك نعبد واياك نستعين"},
      {"number": 6, "text": "اهدنا الصراط المستقيم"},
      {"number": 7, "text": "صراط الذين انعمت عليهم غير المغضوب عليهم ولا الضالين"}
    ]},
    {"number": 2, "name": "Al-Baqara", "ayahs": [
      {"number": 1, "text": "الم"},
      {"number": 2, "text": "ذلك الكتاب لا ريب فيه هدى للمتقين"},
      {"number": 3, "text": "الذين يؤمنون بالغيب ويقيمون الصلاة ومما رزقناهم ينفقون"},
      {"number": 4, "text": "والذين يؤمنون بما انزل اليك وما انزل من قبلك وبالاخرة هم يوقنون"},
      {"number": 5, "text": "اولئك على هدى من ربهم واولئك هم المفلحون"},
      {"number": 6, "text": "ان الذين كفروا سواء عليهم ءانذرتهم ام لم تنذرهم لا يؤمنون"},
      {"number": 7, "text": "ختم الله على قلوبهم وعلى سمعهم وعلى ابصارهم غشاوة ولهم عذاب عظيم"},
      {"number": 8, "text": "ومن الناس من يقول امنا بالله وباليوم الاخر وما هم بمؤمنين"},
      {"number": 255, "text": "الله لا اله الا هو الحي القيوم لا تاخذه سنة ولا نوم له ما في السماوات وما في الارض من ذا الذي يشفع عنده الا باذنه يعلم ما بين ايديهم وما خلفهم ولا يحيطون بشيء من علمه الا بما شاء وسع كرسيه السماوات والارض ولا يؤوده حفظهما وهو العلي العظيم"},
      {"number": 278, "text": "يا ايها الذين امنوا اتقوا الله وذروا ما بقي من الربا ان كنتم مؤمنين"},
      {"number": 279, "text": "فان لم تفعلوا فاذنوا بحرب من الله ورسوله وان تبتم فلكم رءوس اموالكم لا تظلمون ولا تظلمون"},
      {"number": 280, "text": "وان كان ذو عسرة فنظرة الى ميسرة وان تصدقوا خير لكم ان كنتم تعلمون"},
      {"number": 281, "text": "واتقوا يوما ترجعون فيه الى الله ثم توفى كل نفس ما كسبت وهم لا يظلمون"},
      {"number": 282, "text": "يا ايها الذين امنوا اذا تداينتم بدين الى اجل مسمى فاكتبوه وليكتب بينكم كاتب بالعدل ولا ياب كاتب ان يكتب كما علمه الله فليكتب وليملل الذي عليه الحق وليتق الله ربه ولا يبخس منه شيئا"},
      {"number": 283, "text": "وان كنتم على سفر ولم تجدوا كاتبا فرهان مقبوضة فان امن بعضكم بعضا فليؤد الذي اؤتمن امانته وليتق الله ربه ولا تكتموا الشهادة ومن يكتمها فانه اثم قلبه والله بما تعملون عليم"},
      {"number": 284, "text": "لله ما في السماوات وما في الارض وان تبدوا ما في انفسكم او تخفوه يحاسبكم به الله فيغفر لمن يشاء ويعذب من يشاء والله على كل شيء قدير"},
      {"number": 285, "text": "امن الرسول بما انزل اليه من ربه والمؤمنون كل امن بالله وملائكته وكتبه ورسله لا نفرق بين احد من رسله وقالوا سمعنا واطعنا غفرانك ربنا واليك المصير"},
      {"number": 286, "text": "لا يكلف الله نفسا الا وسعها لها ما كسبت وعليها ما اكتسبت ربنا لا تؤاخذنا ان نسينا او اخطانا ربنا ولا تحمل علينا اصرا كما حملته على الذين من قبلنا ربنا ولا تحملنا ما لا طاقة لنا به واعف عنا واغفر لنا وارحمنا انت مولانا فانصرنا على القوم الكافرين"}
    ]},
    {"number": 3, "name": "Al-Imran", "ayahs": [
      {"number": 1, "text": "الم"},
      {"number": 2, "text": "الله لا اله الا هو الحي القيوم"},
      {"number": 3, "text": "نزل عليك الكتاب بالحق مصدقا لما بين يديه وانزل التوراة والانجيل"}
    ]}
  ]
}"#;

pub fn corpus() -> CorpusIndex {
    CorpusIndex::from_json_str(CORPUS_JSON).expect("test corpus is valid")
}

/// A segment reciting one corpus ayah verbatim with word timestamps.
pub fn ayah_segment(
    corpus: &CorpusIndex,
    surah_number: u16,
    ayah_number: u32,
    start: f64,
) -> TranscriptSegment {
    let entry = corpus
        .entry_by_id(surah_number, ayah_number)
        .expect("ayah exists");
    let tokens: Vec<&str> = entry.text.split_whitespace().collect();
    let word_step = 0.55;
    let words: Vec<TranscriptWord> = tokens
        .iter()
        .enumerate()
        .map(|(index, token)| TranscriptWord {
            start: start + index as f64 * word_step,
            end: start + index as f64 * word_step + 0.5,
            text: token.to_string(),
        })
        .collect();
    let end = words.last().map(|word| word.end + 0.2).unwrap_or(start + 1.0);
    TranscriptSegment {
        start,
        end,
        text: entry.text.clone(),
        words,
    }
}

/// A two-second segment without word timings.
pub fn plain_segment(start: f64, text: &str) -> TranscriptSegment {
    TranscriptSegment {
        start,
        end: start + 2.0,
        text: text.to_string(),
        words: Vec::new(),
    }
}
