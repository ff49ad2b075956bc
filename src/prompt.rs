//! Locale-specific prompt construction for story generation.
//!
//! Everything here is pure: identical inputs always produce byte-identical
//! prompts, and unknown language codes fall back to the French template.

use crate::config::OpenAiConfig;
use crate::models::{ChatCompletionRequest, ChatMessage, GenerationRequest, Language, StoryLength};

/// System and user instructions for one generation exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub fn build_prompt(
    name: &str,
    age: u32,
    interests: &str,
    theme: &str,
    length: StoryLength,
    language_code: &str,
) -> Prompt {
    let language = Language::from_code(language_code);
    let words = length.word_count();
    let adjective = length_adjective(language, length);

    let system = persona(language, age);
    let instructions = match language {
        Language::French => format!(
            "Génère une histoire {adjective} (environ {words} mots) et adaptée pour un enfant de {age} ans avec les éléments suivants :
- Prénom de l'enfant : {name}
- Centres d'intérêt : {interests}
- Morale de l'histoire : {theme}

Structure de l'histoire :
1. Introduction : présente le personnage principal et son univers
2. Milieu : introduit une complication ou un défi
3. Fin : résout le problème de manière positive

Réponds avec un titre court et accrocheur sur la première ligne, suivi d'une ligne vide, puis l'histoire.
L'histoire doit être positive et encourageante.
Utilise un vocabulaire et des concepts adaptés à l'âge de l'enfant.

IMPORTANT : La morale doit être implicite dans l'histoire, transmise à travers les actions et les choix des personnages.
Ne mentionne jamais explicitement la morale à la fin de l'histoire.
Ne termine pas l'histoire en expliquant ce que l'enfant a appris.
Laisse le lecteur tirer ses propres conclusions."
        ),
        Language::English => format!(
            "Generate a {adjective} story (about {words} words) adapted for a {age}-year-old child with the following elements:
- Child's name: {name}
- Interests: {interests}
- Story's moral: {theme}

Story structure:
1. Introduction: introduce the main character and their world
2. Middle: introduce a complication or challenge
3. End: resolve the problem in a positive way

Respond with a short catchy title on the first line, followed by a blank line, then the story.
The story should be positive and encouraging.
Use vocabulary and concepts appropriate for the child's age.

IMPORTANT: The moral should be implicit in the story, conveyed through the characters' actions and choices.
Never explicitly state the moral at the end of the story.
Do not end the story by explaining what the child learned.
Let the reader draw their own conclusions."
        ),
        Language::Spanish => format!(
            "Genera una historia {adjective} (aproximadamente {words} palabras) adaptada para un niño de {age} años con los siguientes elementos:
- Nombre del niño: {name}
- Intereses: {interests}
- Moraleja de la historia: {theme}

Estructura de la historia:
1. Introducción: presenta al personaje principal y su mundo
2. Medio: introduce una complicación o desafío
3. Final: resuelve el problema de manera positiva

Responde con un título corto y atractivo en la primera línea, seguido de una línea en blanco, luego la historia.
La historia debe ser positiva y alentadora.
Utiliza vocabulario y conceptos apropiados para la edad del niño.

IMPORTANTE: La moraleja debe ser implícita en la historia, transmitida a través de las acciones y elecciones de los personajes.
Nunca menciones explícitamente la moraleja al final de la historia.
No termines la historia explicando lo que el niño aprendió.
Deja que el lector saque sus propias conclusiones."
        ),
        Language::Russian => format!(
            "Создайте {adjective} историю (примерно {words} слов), адаптированную для ребенка {age} лет, со следующими элементами:
- Имя ребенка: {name}
- Интересы: {interests}
- Мораль истории: {theme}

Структура истории:
1. Введение: представьте главного героя и его мир
2. Середина: введите осложнение или вызов
3. Конец: решите проблему положительным образом

Ответьте коротким привлекательным заголовком на первой строке, затем пустая строка и сама история.
История должна быть позитивной и вдохновляющей.
Используйте словарный запас и понятия, соответствующие возрасту ребенка.

ВАЖНО: Мораль должна быть неявной в истории, передаваемой через действия и выбор персонажей.
Никогда не упоминайте мораль явно в конце истории.
Не заканчивайте историю объяснением того, чему научился ребенок.
Позвольте читателю сделать свои собственные выводы."
        ),
    };

    let user = format!("{system}\n\n{instructions}");
    Prompt { system, user }
}

pub fn prompt_for(request: &GenerationRequest) -> Prompt {
    build_prompt(
        request.subject_name(),
        request.subject_age(),
        request.interests(),
        request.theme(),
        request.length(),
        request.language(),
    )
}

pub fn build_chat_request(prompt: &Prompt, cfg: &OpenAiConfig) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: cfg.model.clone(),
        messages: vec![
            ChatMessage::system(prompt.system.clone()),
            ChatMessage::user(prompt.user.clone()),
        ],
        temperature: cfg.temperature,
        max_tokens: cfg.max_tokens,
        top_p: cfg.top_p,
        frequency_penalty: cfg.frequency_penalty,
        presence_penalty: cfg.presence_penalty,
    }
}

fn persona(language: Language, age: u32) -> String {
    match language {
        Language::French => format!(
            "Tu es un conteur pour enfants expert en histoires courtes et amusantes en français. Adapte ton langage et la complexité de l'histoire pour un enfant de {age} ans."
        ),
        Language::English => format!(
            "You are a storyteller expert in short and fun children's stories in English. Adapt your language and story complexity for a {age}-year-old child."
        ),
        Language::Spanish => format!(
            "Eres un cuentacuentos experto en historias cortas y divertidas para niños en español. Adapta tu lenguaje y la complejidad de la historia para un niño de {age} años."
        ),
        Language::Russian => format!(
            "Вы рассказчик, специализирующийся на коротких и веселых детских историях на русском языке. Адаптируйте язык и сложность истории для ребенка {age} лет."
        ),
    }
}

fn length_adjective(language: Language, length: StoryLength) -> &'static str {
    match (language, length) {
        (Language::French, StoryLength::Short) => "courte",
        (Language::French, StoryLength::Medium) => "de longueur moyenne",
        (Language::French, StoryLength::Long) => "longue",
        (Language::English, StoryLength::Short) => "short",
        (Language::English, StoryLength::Medium) => "medium-length",
        (Language::English, StoryLength::Long) => "long",
        (Language::Spanish, StoryLength::Short) => "corta",
        (Language::Spanish, StoryLength::Medium) => "de longitud media",
        (Language::Spanish, StoryLength::Long) => "larga",
        (Language::Russian, StoryLength::Short) => "короткую",
        (Language::Russian, StoryLength::Medium) => "среднюю",
        (Language::Russian, StoryLength::Long) => "длинную",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_is_deterministic() {
        let a = build_prompt("Léa", 6, "les chats", "le partage", StoryLength::Short, "fr");
        let b = build_prompt("Léa", 6, "les chats", "le partage", StoryLength::Short, "fr");
        assert_eq!(a, b);
        assert_eq!(a.user.as_bytes(), b.user.as_bytes());
    }

    #[test]
    fn test_unknown_language_uses_french_template() {
        let fallback = build_prompt("Tom", 5, "trains", "patience", StoryLength::Medium, "de");
        let french = build_prompt("Tom", 5, "trains", "patience", StoryLength::Medium, "fr");
        assert_eq!(fallback, french);
        assert!(fallback.system.starts_with("Tu es un conteur"));
    }

    #[test]
    fn test_word_count_and_fields_embedded() {
        let prompt = build_prompt("Tom", 8, "space", "courage", StoryLength::Long, "en");
        assert!(prompt.user.contains("about 500 words"));
        assert!(prompt.user.contains("a long story"));
        assert!(prompt.user.contains("Child's name: Tom"));
        assert!(prompt.user.contains("Interests: space"));
        assert!(prompt.user.contains("Story's moral: courage"));
        assert!(prompt.system.contains("8-year-old"));
    }

    #[test]
    fn test_moral_stays_implicit_in_every_language() {
        let markers = [
            ("fr", "La morale doit être implicite"),
            ("en", "The moral should be implicit"),
            ("es", "La moraleja debe ser implícita"),
            ("ru", "Мораль должна быть неявной"),
        ];
        for (code, marker) in markers {
            let prompt = build_prompt("Ana", 4, "music", "kindness", StoryLength::Short, code);
            assert!(prompt.user.contains(marker), "missing constraint for {code}");
        }
        let en = build_prompt("Ana", 4, "music", "kindness", StoryLength::Short, "en");
        assert!(en.user.contains("Do not end the story by explaining what the child learned."));
    }

    #[test]
    fn test_chat_request_carries_sampling_parameters() {
        let cfg = OpenAiConfig::default();
        let prompt = build_prompt("Ana", 4, "music", "kindness", StoryLength::Short, "es");
        let req = build_chat_request(&prompt, &cfg);
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["max_tokens"], 800);
        assert_eq!(json["top_p"], 1.0);
        assert_eq!(json["frequency_penalty"], 0.0);
        assert_eq!(json["presence_penalty"], 0.0);
        assert_eq!(json["temperature"], 0.7);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], prompt.system);
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], prompt.user);
    }
}
