//! Tracks - regulatory categories and their existing rule catalogs
//!
//! The catalog is read-only reference data during a pipeline run. The
//! reference deployment ships three tracks (contracts, salaries, invoices);
//! nothing downstream depends on that count.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a track catalog
#[derive(Error, Debug)]
pub enum TrackCatalogError {
    /// Catalog file could not be read
    #[error("Failed to read track catalog: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog JSON is malformed
    #[error("Invalid track catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Catalog holds no tracks
    #[error("Track catalog is empty")]
    Empty,

    /// Two tracks share an id
    #[error("Duplicate track id: {0}")]
    DuplicateTrack(String),
}

/// A rule already present in a track's catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingRule {
    /// Rule identifier (e.g. `SAL-001`)
    pub id: String,

    /// Rule description
    pub description: String,
}

impl ExistingRule {
    /// Create an existing rule entry
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

/// A regulatory category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Stable identifier (e.g. `salaries`)
    pub track_id: String,

    /// Display name
    pub name: String,

    /// English display name
    #[serde(default)]
    pub name_en: String,

    /// What the track covers
    pub definition: String,

    /// Rules the organisation already enforces
    #[serde(default)]
    pub existing_rules: Vec<ExistingRule>,

    /// Terms used by keyword mapping
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Queries issued against the store in retrieval mode
    #[serde(default)]
    pub retrieval_queries: Vec<String>,
}

/// Serialized catalog forms: a list of tracks or a map keyed by track id
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogRepr {
    List(Vec<Track>),
    Map(BTreeMap<String, TrackBody>),
}

#[derive(Deserialize)]
struct TrackBody {
    name: String,
    #[serde(default)]
    name_en: String,
    definition: String,
    #[serde(default)]
    existing_rules: Vec<ExistingRule>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    retrieval_queries: Vec<String>,
}

/// Ordered, id-unique set of tracks
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TrackCatalog {
    tracks: Vec<Track>,
}

impl TrackCatalog {
    /// Build a catalog, rejecting empty sets and duplicate ids
    pub fn new(tracks: Vec<Track>) -> Result<Self, TrackCatalogError> {
        if tracks.is_empty() {
            return Err(TrackCatalogError::Empty);
        }
        for (i, track) in tracks.iter().enumerate() {
            if tracks[..i].iter().any(|t| t.track_id == track.track_id) {
                return Err(TrackCatalogError::DuplicateTrack(track.track_id.clone()));
            }
        }
        Ok(Self { tracks })
    }

    /// Parse a catalog from JSON (list of tracks, or map of id to track)
    pub fn from_json(json: &str) -> Result<Self, TrackCatalogError> {
        let tracks = match serde_json::from_str::<CatalogRepr>(json)? {
            CatalogRepr::List(tracks) => tracks,
            CatalogRepr::Map(map) => map
                .into_iter()
                .map(|(track_id, body)| Track {
                    track_id,
                    name: body.name,
                    name_en: body.name_en,
                    definition: body.definition,
                    existing_rules: body.existing_rules,
                    keywords: body.keywords,
                    retrieval_queries: body.retrieval_queries,
                })
                .collect(),
        };
        Self::new(tracks)
    }

    /// Load a catalog from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TrackCatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Look up a track by id
    pub fn get(&self, track_id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    /// Whether a track id exists
    pub fn contains(&self, track_id: &str) -> bool {
        self.get(track_id).is_some()
    }

    /// Track ids in catalog order
    pub fn ids(&self) -> Vec<&str> {
        self.tracks.iter().map(|t| t.track_id.as_str()).collect()
    }

    /// Iterate over tracks in catalog order
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    /// Number of tracks
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Always false for a constructed catalog
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Retrieval queries of every track, in catalog order
    pub fn all_queries(&self) -> Vec<String> {
        self.tracks
            .iter()
            .flat_map(|t| t.retrieval_queries.iter().cloned())
            .collect()
    }

    /// The reference deployment's three tracks
    pub fn reference() -> Self {
        Self {
            tracks: vec![contracts(), salaries(), invoices()],
        }
    }
}

impl Default for TrackCatalog {
    fn default() -> Self {
        Self::reference()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn contracts() -> Track {
    Track {
        track_id: "contracts".to_string(),
        name: "العقود".to_string(),
        name_en: "Contracts".to_string(),
        definition: "يشمل أوامر دفع بناءً على نسبة إنجاز أو معلم محدد ضمن العقد، ويخضع للأنظمة مثل نظام المنافسات والمشتريات، تعليمات تنفيذ الميزانية، نظام استئجار العقار، وأوامر سامية".to_string(),
        existing_rules: vec![
            ExistingRule::new("CON-001", "وجود مستخلص يعكس مرحلته (أولي/جاري/ختامي) ومطابق لبيانات العقد وجدول الدفعات"),
            ExistingRule::new("CON-002", "في حالة المستخلص الختامي، يجب ألا تقل نسبته عن %10 من إجمالي قيمة العقد لعقود الإنشاءات العامة و %5 من العقود الأخرى"),
            ExistingRule::new("CON-003", "التحقق من سلامة إجراءات الترسية وأنها تمت وفقا لنظام المنافسات والمشتريات الحكومية والأنظمة والتعليمات ذات العلاقة وعدم وجود تحفظات في محضر لجنة فحص العروض"),
            ExistingRule::new("CON-004", "محضر تسليم الموقع أو بدء الأعمال"),
        ],
        keywords: strings(&["عقد", "مستخلص", "ترسية", "منافسات", "مشتريات", "إنشاءات", "مقاول"]),
        retrieval_queries: strings(&[
            "ما هي جميع القواعد والشروط المتعلقة بالعقود والمستخلصات والترسية والمنافسات؟",
        ]),
    }
}

fn salaries() -> Track {
    Track {
        track_id: "salaries".to_string(),
        name: "الرواتب".to_string(),
        name_en: "Salaries".to_string(),
        definition: "يشمل أوامر الدفع المتعلقة برواتب الموظفين، والبدلات، والمزايا الأخرى المرتبطة بالخدمة الحكومية".to_string(),
        existing_rules: vec![
            ExistingRule::new("SAL-001", "التحقق من أن مجموع الحسميات لا يتجاوز ثلث الراتب الأساسي"),
            ExistingRule::new("SAL-002", "التحقق من عدم اختلاف صافي راتب الفرد بما لا يتجاوز 3%"),
            ExistingRule::new("SAL-003", "التحقق من أن الراتب الأساسي لكل موظف يتطابق مع الدرجة الوظيفية في السلم الرسمي"),
            ExistingRule::new("SAL-004", "التحقق من وجود خطاب تكليف للعمل الإضافي يتضمن جميع التفاصيل"),
        ],
        keywords: strings(&["راتب", "موظف", "حسميات", "بدل", "عمل إضافي", "درجة وظيفية"]),
        retrieval_queries: strings(&[
            "ما هي جميع القواعد والشروط المتعلقة بالرواتب والحسميات والبدلات والدرجات الوظيفية؟",
        ]),
    }
}

fn invoices() -> Track {
    Track {
        track_id: "invoices".to_string(),
        name: "الفواتير".to_string(),
        name_en: "Invoices".to_string(),
        definition: "يشمل المطالبات الناتجة عن فواتير الكهرباء، المياه، الجوال، وغيرها المقدمة مقابل خدمات استهلاكية فعلية".to_string(),
        existing_rules: vec![
            ExistingRule::new("INV-001", "التحقق من عدم تكرار الصرف لنفس العملية"),
            ExistingRule::new("INV-002", "التحقق من مطابقة المبالغ المراد صرفها مع الفواتير"),
            ExistingRule::new("INV-003", "التحقق من أن الخدمة مرتبطة بجهة حكومية وليست بجهة خارجية"),
            ExistingRule::new("INV-004", "التحقق من مطابقتها لتسعيرة الشرائح الحكومية"),
        ],
        keywords: strings(&["فاتورة", "كهرباء", "مياه", "جوال", "خدمات", "استهلاكية", "تسعيرة"]),
        retrieval_queries: strings(&[
            "ما هي جميع القواعد والشروط المتعلقة بالفواتير والخدمات الاستهلاكية والتسعيرة الحكومية؟",
        ]),
    }
}
