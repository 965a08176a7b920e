use once_cell::sync::Lazy;
use regex::Regex;

/// Matches any Arabic code point across the base block, supplement,
/// Extended-A and both presentation-form blocks.
static ARABIC_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x{0600}-\x{06FF}\x{0750}-\x{077F}\x{08A0}-\x{08FF}\x{FB50}-\x{FDFF}\x{FE70}-\x{FEFF}]")
        .unwrap()
});

/// Question language, decided purely by the presence of Arabic characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Arabic,
    English,
}

impl Language {
    pub fn detect(text: &str) -> Self {
        if ARABIC_PATTERN.is_match(text) {
            Self::Arabic
        } else {
            Self::English
        }
    }

    pub fn is_arabic(self) -> bool {
        matches!(self, Self::Arabic)
    }

    /// Returned when retrieval finds nothing above the relevance floor.
    pub fn no_context_message(self) -> &'static str {
        match self {
            Self::Arabic => {
                "عذراً، لم أجد معلومات محددة حول هذا السؤال في تقارير صندوق الاستثمارات العامة السنوية. يمكنك إعادة صياغة سؤالك أو السؤال عن جانب مختلف من استثمارات الصندوق."
            }
            Self::English => {
                "I'm sorry, I couldn't find specific information about that in the PIF annual reports. You can rephrase your question or ask about a different aspect of PIF's investments."
            }
        }
    }

    /// Returned when the answer pipeline itself fails. The front end maps
    /// any transport-level failure to this so no error text leaks out.
    pub fn error_message(self) -> &'static str {
        match self {
            Self::Arabic => {
                "عذراً، حدث خطأ في معالجة سؤالك. يرجى المحاولة مرة أخرى أو طرح سؤال مختلف."
            }
            Self::English => {
                "I'm sorry, there was an error processing your question. Please try again or ask a different question."
            }
        }
    }

    /// Prefix of the extractive fallback answer.
    pub fn fallback_intro(self) -> &'static str {
        match self {
            Self::Arabic => "بناءً على المعلومات المتاحة في تقارير صندوق الاستثمارات العامة:\n\n",
            Self::English => "Based on the PIF annual reports:\n\n",
        }
    }

    pub fn context_header(self) -> &'static str {
        match self {
            Self::Arabic => "السياق من تقارير صندوق الاستثمارات العامة:",
            Self::English => "Context from PIF Annual Reports:",
        }
    }

    pub fn history_header(self) -> &'static str {
        match self {
            Self::Arabic => "المحادثة السابقة:",
            Self::English => "Previous conversation:",
        }
    }

    pub fn user_label(self) -> &'static str {
        match self {
            Self::Arabic => "المستخدم",
            Self::English => "User",
        }
    }

    pub fn assistant_label(self) -> &'static str {
        match self {
            Self::Arabic => "المساعد",
            Self::English => "Assistant",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_arabic_base_block() {
        assert_eq!(Language::detect("ما هي استثمارات نيوم؟"), Language::Arabic);
    }

    #[test]
    fn test_detects_arabic_presentation_forms() {
        // U+FE8D ARABIC LETTER ALEF ISOLATED FORM
        assert_eq!(Language::detect("\u{FE8D}"), Language::Arabic);
    }

    #[test]
    fn test_single_arabic_char_in_english_text() {
        assert_eq!(
            Language::detect("what about \u{0633} this"),
            Language::Arabic
        );
    }

    #[test]
    fn test_english_text() {
        assert_eq!(
            Language::detect("What were PIF's investments in 2023?"),
            Language::English
        );
    }

    #[test]
    fn test_empty_string_is_english() {
        assert_eq!(Language::detect(""), Language::English);
    }

    #[test]
    fn test_messages_differ_per_language() {
        assert_ne!(
            Language::Arabic.no_context_message(),
            Language::English.no_context_message()
        );
        assert_ne!(
            Language::Arabic.fallback_intro(),
            Language::English.fallback_intro()
        );
    }
}
