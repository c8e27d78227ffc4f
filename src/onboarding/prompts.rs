//! User-facing texts for the bot persona and the LLM prompt template.
//!
//! The bot speaks Arabic. Every canned reply the orchestrator can send lives
//! here so the conversation flow reads independently of the wording.

use crate::store::UserProfile;

/// Sent on a new user's first message.
pub const WELCOME: &str =
    "مرحباً 👋 أنا الخرابة، بوت الذكاء الاصطناعي الخاص بهذا السيرفر 🤖\nما اسمك؟ أود أن أتعرف عليك 😊";

/// Sent when the global rate window is full.
pub const RATE_LIMITED: &str =
    "عذراً، لقد تجاوزت الحد المسموح به من الطلبات يرجى المحاولة بعد دقيقة ⏳";

/// Sent when the LLM returns no text.
pub const EMPTY_GENERATION: &str = "عذراً، لم أستطع توليد إجابة";

/// Sent when handling a message fails for any reason.
pub const GENERIC_APOLOGY: &str = "عذراً، حدث خطأ أثناء معالجة طلبك";

/// Confirmation after a user supplies their name.
pub fn registration_complete(name: &str) -> String {
    format!("أهلاً {name} 😊 سعيد بالتعرف عليك أنا هنا لمساعدتك في أي وقت 🌟")
}

/// Reply to "who are you?".
pub fn identity_reply(profile: &UserProfile) -> String {
    format!(
        "أنا بوت الخرابة AI 🤖\n\n\
         أهلاً {name} أنا أتذكرك جيداً 😊\n\
         تم تدريبي من قبل مطورين متميزين في هذا السيرفر\n\n\
         تعرفنا على بعض بتاريخ: {date}\n\n\
         أنا هنا لمساعدتك والإجابة على أسئلتك 🌟",
        name = profile.name,
        date = profile.registration_date,
    )
}

/// Reply to "what's your name?".
pub fn name_reply(profile: &UserProfile) -> String {
    format!(
        "اسمي الخرابة 😎\n\
         وأنت {name}، أتذكرك منذ {date} 🌟\n\
         أنا بوت ذكاء اصطناعي متخصص في مساعدتك والإجابة على أسئلتك 🤖",
        name = profile.name,
        date = profile.registration_date,
    )
}

/// Build the LLM prompt: the user's stored name followed by their message.
pub fn generation_prompt(profile: &UserProfile, message: &str) -> String {
    format!("المستخدم اسمه {} {}", profile.name, message)
}
