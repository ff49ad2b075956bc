use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Target length of a generated story
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl StoryLength {
    pub fn word_count(self) -> u32 {
        match self {
            StoryLength::Short => 150,
            StoryLength::Medium => 300,
            StoryLength::Long => 500,
        }
    }
}

impl std::str::FromStr for StoryLength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "short" => Ok(StoryLength::Short),
            "medium" => Ok(StoryLength::Medium),
            "long" => Ok(StoryLength::Long),
            other => Err(format!("unknown story length: {other}")),
        }
    }
}

/// Languages with a dedicated prompt template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    French,
    English,
    Spanish,
    Russian,
}

impl Language {
    pub const DEFAULT: Language = Language::French;

    /// Exact match on the language code, falling back to the default
    pub fn from_code(code: &str) -> Self {
        match code {
            "fr" => Language::French,
            "en" => Language::English,
            "es" => Language::Spanish,
            "ru" => Language::Russian,
            _ => Self::DEFAULT,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::French => "fr",
            Language::English => "en",
            Language::Spanish => "es",
            Language::Russian => "ru",
        }
    }
}

/// A child's profile as kept by the host application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildProfile {
    pub id: Uuid,
    pub name: String,
    pub age: u32,
    pub activity: String,
    pub interests: String,
}

impl ChildProfile {
    pub fn new(name: String, age: u32, activity: String, interests: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            age,
            activity,
            interests,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
            && self.age > 0
            && !self.activity.trim().is_empty()
            && !self.interests.trim().is_empty()
    }

    pub fn story_request(
        &self,
        theme: impl Into<String>,
        length: StoryLength,
        language: impl Into<String>,
    ) -> GenerationRequest {
        GenerationRequest::new(
            self.name.clone(),
            self.age,
            self.interests.clone(),
            theme.into(),
            length,
            language.into(),
        )
    }
}

/// Everything needed to generate one story. Fields are read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    subject_name: String,
    subject_age: u32,
    interests: String,
    theme: String,
    length: StoryLength,
    language: String,
}

impl GenerationRequest {
    pub fn new(
        subject_name: String,
        subject_age: u32,
        interests: String,
        theme: String,
        length: StoryLength,
        language: String,
    ) -> Self {
        Self {
            subject_name,
            subject_age,
            interests,
            theme,
            length,
            language,
        }
    }

    pub fn subject_name(&self) -> &str {
        &self.subject_name
    }

    pub fn subject_age(&self) -> u32 {
        self.subject_age
    }

    pub fn interests(&self) -> &str {
        &self.interests
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn length(&self) -> StoryLength {
        self.length
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

/// A generated story, split into its title and body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub title: String,
    pub body: String,
}

// OpenAI chat message format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

// Chat completion request body
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

// Chat completion response body; only the fields we read
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// `{"error": {"message": ...}}` envelope returned with non-2xx statuses
#[derive(Debug, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_counts() {
        assert_eq!(StoryLength::Short.word_count(), 150);
        assert_eq!(StoryLength::Medium.word_count(), 300);
        assert_eq!(StoryLength::Long.word_count(), 500);
    }

    #[test]
    fn test_language_fallback() {
        assert_eq!(Language::from_code("es"), Language::Spanish);
        assert_eq!(Language::from_code("de"), Language::French);
        // Exact match only
        assert_eq!(Language::from_code("EN"), Language::French);
        assert_eq!(Language::from_code(""), Language::French);
    }

    #[test]
    fn test_profile_validity() {
        let profile = ChildProfile::new("Léa".into(), 6, "danse".into(), "les chats".into());
        assert!(profile.is_valid());

        let mut invalid = profile.clone();
        invalid.age = 0;
        assert!(!invalid.is_valid());

        let mut blank = profile.clone();
        blank.name = "  ".into();
        assert!(!blank.is_valid());
    }

    #[test]
    fn test_profile_builds_request() {
        let profile = ChildProfile::new("Tom".into(), 7, "football".into(), "dinosaurs".into());
        let req = profile.story_request("sharing", StoryLength::Long, "en");
        assert_eq!(req.subject_name(), "Tom");
        assert_eq!(req.subject_age(), 7);
        assert_eq!(req.interests(), "dinosaurs");
        assert_eq!(req.theme(), "sharing");
        assert_eq!(req.length(), StoryLength::Long);
        assert_eq!(req.language(), "en");
    }

    #[test]
    fn test_response_tolerates_null_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
