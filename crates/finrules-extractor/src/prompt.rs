//! LLM prompt engineering for rule extraction and track classification

use finrules_domain::TrackCatalog;

/// Builds prompts that carry the track catalog
pub struct PromptBuilder<'a> {
    catalog: &'a TrackCatalog,
}

impl<'a> PromptBuilder<'a> {
    /// Create a prompt builder over `catalog`
    pub fn new(catalog: &'a TrackCatalog) -> Self {
        Self { catalog }
    }

    /// Prompt asking for every rule in `text`
    pub fn extraction(&self, text: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str(EXTRACTION_INSTRUCTIONS);
        prompt.push_str("\n\nالمسارات المالية المحددة:\n");
        for track in self.catalog.iter() {
            prompt.push_str(&format!(
                "- {} ({}) [{}]: {}\n",
                track.name, track.name_en, track.track_id, track.definition
            ));
        }

        prompt.push_str("\nالنص:\n---\n");
        prompt.push_str(text);
        prompt.push_str("\n---\n\n");

        prompt.push_str(&format!(
            "{}\n{{\n  \"rules\": [\n    {{\n      \"text\": \"نص القاعدة\",\n      \"track\": \"{}|unknown\",\n      \"confidence\": 0.0,\n      \"notes\": \"ملاحظات إضافية\"\n    }}\n  ]\n}}\n\nJSON:",
            OUTPUT_FORMAT_REMINDER,
            self.track_choices()
        ));

        prompt
    }

    /// Prompt asking which track `rule_text` belongs to
    pub fn mapping(&self, rule_text: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str(MAPPING_INSTRUCTIONS);
        prompt.push_str("\n\nالمسارات المالية المتاحة:\n");
        for track in self.catalog.iter() {
            prompt.push_str(&format!("- {}: {} - {}\n", track.track_id, track.name, track.definition));
        }

        prompt.push_str(&format!("\nالقاعدة المراد تصنيفها:\n\"{}\"\n\n", rule_text));
        prompt.push_str(&format!(
            "{}\n{{\n  \"track_id\": \"{}|none\",\n  \"confidence\": 0.0,\n  \"reasoning\": \"سبب التصنيف\"\n}}\n\nJSON:",
            OUTPUT_FORMAT_REMINDER,
            self.track_choices()
        ));

        prompt
    }

    fn track_choices(&self) -> String {
        self.catalog.ids().join("|")
    }
}

const EXTRACTION_INSTRUCTIONS: &str = "أنت محلل امتثال مالي متخصص في استخراج القواعد والشروط من الوثائق الرسمية.

مهمتك:
1. استخرج جميع القواعد والشروط والمتطلبات من النص أدناه
2. لكل قاعدة حدد نصها بالعربية والمسار المالي المرتبط بها ومستوى الثقة (0-1)
3. ركز على القواعد المتعلقة بالتحقق والمطابقة والشروط
4. النص مقسم إلى مقاطع معنونة [segment N]";

const MAPPING_INSTRUCTIONS: &str = "أنت محلل مالي متخصص في تصنيف القواعد المالية.
حدد المسار المالي الأنسب للقاعدة التالية ومستوى ثقتك في التصنيف (0-1).
إذا لم تنتمِ القاعدة إلى أي مسار فأعد none.";

const OUTPUT_FORMAT_REMINDER: &str = "أعد النتيجة بصيغة JSON فقط كالتالي:";
