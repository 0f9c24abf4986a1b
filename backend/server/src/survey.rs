//! # Questionnaire
//!
//! Fixed dealer questionnaire: eight single-choice questions and one optional free-text
//! question. Each submission becomes one row of 13 columns:
//!
//! `timestamp_utc, username, name, email, Q1..Q9`
//!
//! Choice questions preselect their second option, so an omitted answer takes that
//! default rather than failing the submission.
use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::auth::Identity;

pub const USERNAME_COLUMN: &str = "username";
pub const META_COLUMNS: [&str; 4] = ["timestamp_utc", USERNAME_COLUMN, "name", "email"];
pub const QUESTION_COUNT: usize = 9;
pub const COLUMN_COUNT: usize = META_COLUMNS.len() + QUESTION_COUNT;

pub const NOTICE_ALREADY_SUBMITTED: &str =
    "Bu kullanıcı ile daha önce anket yanıtı gönderilmiş görünüyor. Tekrar gönderime kapalıdır.";
pub const NOTICE_RECORDED: &str = "Yanıtlarınız başarıyla kaydedildi. Teşekkür ederiz!";
pub const NOTICE_RESUBMIT_OPEN: &str =
    "Not: Bu kullanıcı için tekrar yanıt gönderimine izin veriliyor (allow_resubmit=True).";
pub const NOTICE_RESUBMIT_CLOSED: &str = "Bu kullanıcı için tekrar yanıt gönderimi kapatıldı.";

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionKind {
    Choice {
        options: &'static [&'static str],
        default: usize,
    },
    Text {
        placeholder: &'static str,
    },
}

#[derive(Debug, Serialize)]
pub struct Question {
    pub key: &'static str,
    pub column: &'static str,
    pub prompt: &'static str,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

const fn choice(
    key: &'static str,
    column: &'static str,
    prompt: &'static str,
    options: &'static [&'static str],
) -> Question {
    Question {
        key,
        column,
        prompt,
        kind: QuestionKind::Choice {
            options,
            default: 1,
        },
    }
}

pub static QUESTIONS: [Question; QUESTION_COUNT] = [
    choice(
        "q1",
        "Q1_kalite",
        "1) Ürünlerimizin genel kalitesinden ne kadar memnunsunuz?",
        &[
            "Çok memnunum",
            "Memnunum",
            "Kararsızım",
            "Memnun değilim",
            "Hiç memnun değilim",
        ],
    ),
    choice(
        "q2",
        "Q2_çeşitlilik",
        "2) Ürün çeşitliliğimiz (farklı tatlar, ambalaj boyutları vb.) beklentilerinizi karşılıyor mu?",
        &["Evet, tamamen", "Kısmen", "Hayır"],
    ),
    choice(
        "q3",
        "Q3_ambalaj",
        "3) Ürün ambalajlarımızın görünümü ve dayanıklılığı hakkında ne düşünüyorsunuz?",
        &["Çok beğeniyorum", "İyi", "Geliştirilebilir", "Yetersiz"],
    ),
    choice(
        "q4",
        "Q4_fiyat_konum",
        "4) Ürün fiyatlarımız piyasadaki benzer ürünlerle karşılaştırıldığında sizce nasıl konumlanıyor?",
        &["Daha uygun", "Benzer", "Biraz yüksek", "Çok yüksek"],
    ),
    choice(
        "q5",
        "Q5_kar_marjı",
        "5) Bayi kâr marjınızı yeterli buluyor musunuz?",
        &["Evet", "Kısmen", "Hayır"],
    ),
    choice(
        "q6",
        "Q6_loji_memnuniyet",
        "6) Teslimat süreleri, stok durumu ve lojistik süreçlerinden memnun musunuz?",
        &["Evet", "Kısmen", "Hayır"],
    ),
    choice(
        "q7",
        "Q7_stok_sıkıntısı",
        "7) Talep ettiğiniz ürünlerde stok sıkıntısı yaşadığınız oluyor mu?",
        &["Hiçbir zaman", "Ara sıra", "Sık sık"],
    ),
    choice(
        "q8",
        "Q8_iletisim",
        "8) Satış ekibimizle iletişim, kampanya bilgilendirmeleri ve destek süreçlerini nasıl değerlendiriyorsunuz?",
        &["Çok başarılı", "İyi", "Geliştirilmeli", "Zayıf"],
    ),
    Question {
        key: "q9",
        column: "Q9_acik_öneri",
        prompt: "9) Ürünlerimiz veya işbirliğimizle ilgili geliştirilmesini istediğiniz konular nelerdir? (Opsiyonel)",
        kind: QuestionKind::Text {
            placeholder: "Örn: 2100 g ambalaj kapak kalitesi, sevkiyat planlarının haftalık paylaşımı vb.",
        },
    },
];

/// Ordered header row every response store is created with.
pub fn header() -> Vec<String> {
    META_COLUMNS
        .iter()
        .copied()
        .chain(QUESTIONS.iter().map(|question| question.column))
        .map(str::to_string)
        .collect()
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SurveyError {
    #[error("Unknown question {0}")]
    UnknownQuestion(String),

    #[error("{value:?} is not an option of {question}")]
    InvalidOption {
        question: &'static str,
        value: String,
    },
}

/// Validated answers, one value per question in questionnaire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answers(Vec<String>);

impl Answers {
    pub fn resolve(raw: &BTreeMap<String, String>) -> Result<Self, SurveyError> {
        if let Some(unknown) = raw
            .keys()
            .find(|key| !QUESTIONS.iter().any(|question| question.key == key.as_str()))
        {
            return Err(SurveyError::UnknownQuestion(unknown.clone()));
        }

        QUESTIONS
            .iter()
            .map(|question| {
                let given = raw.get(question.key);

                match &question.kind {
                    QuestionKind::Choice { options, default } => match given {
                        None => Ok(options[*default].to_string()),
                        Some(value) if options.iter().any(|option| *option == value.as_str()) => {
                            Ok(value.clone())
                        }
                        Some(value) => Err(SurveyError::InvalidOption {
                            question: question.key,
                            value: value.clone(),
                        }),
                    },
                    QuestionKind::Text { .. } => {
                        Ok(given.map(|text| text.trim().to_string()).unwrap_or_default())
                    }
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub answers: Answers,
}

impl ResponseRecord {
    pub fn new(identity: &Identity, answers: Answers, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            username: identity.username.clone(),
            display_name: identity.display_name.clone(),
            email: identity.email.clone(),
            answers,
        }
    }

    /// Row values in [`header`] order.
    pub fn to_row(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(COLUMN_COUNT);
        row.push(self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, false));
        row.push(self.username.clone());
        row.push(self.display_name.clone());
        row.push(self.email.clone());
        row.extend(self.answers.values().iter().cloned());
        row
    }
}
