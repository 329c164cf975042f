use clap::ValueEnum;

/// Languages the pipeline can transcribe from or translate into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Language {
    English,
    SimplifiedChinese,
    Japanese,
    Korean,
    German,
    Turkish,
    Russian,
}

impl Language {
    /// Internal language code, used in task parameters and artifact metadata.
    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::SimplifiedChinese => "zh_cn",
            Self::Japanese => "ja",
            Self::Korean => "ko",
            Self::German => "de",
            Self::Turkish => "tr",
            Self::Russian => "ru",
        }
    }

    /// Code handed to the ASR backend. Whisper knows `zh`, not `zh_cn`.
    pub fn asr_code(&self) -> &'static str {
        match self {
            Self::SimplifiedChinese => "zh",
            other => other.code(),
        }
    }

    /// Human-readable English name, used to parameterize translation prompts.
    pub fn english_name(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::SimplifiedChinese => "Simplified Chinese",
            Self::Japanese => "Japanese",
            Self::Korean => "Korean",
            Self::German => "German",
            Self::Turkish => "Turkish",
            Self::Russian => "Russian",
        }
    }

    pub fn chinese_name(&self) -> &'static str {
        match self {
            Self::English => "英语",
            Self::SimplifiedChinese => "简体中文",
            Self::Japanese => "日语",
            Self::Korean => "韩语",
            Self::German => "德语",
            Self::Turkish => "土耳其语",
            Self::Russian => "俄语",
        }
    }

    /// Whether sentences in this language are sequences of space-delimited
    /// words. Character-based languages are aligned grapheme by grapheme.
    pub fn is_space_delimited(&self) -> bool {
        matches!(
            self,
            Self::English | Self::German | Self::Turkish | Self::Russian
        )
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Language the UI (and artifact display names) should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum UiLanguage {
    #[default]
    English,
    SimplifiedChinese,
}

impl UiLanguage {
    /// Display name for a single-language subtitle file.
    pub fn subtitle_display_name(&self, language: Language) -> String {
        match self {
            Self::English => format!("{} Subtitle", language.english_name()),
            Self::SimplifiedChinese => format!("{} 单语字幕", language.chinese_name()),
        }
    }

    /// Display name for the bilingual subtitle file.
    pub fn bilingual_display_name(&self) -> &'static str {
        match self {
            Self::English => "Bilingual Subtitle",
            Self::SimplifiedChinese => "双语字幕",
        }
    }
}
