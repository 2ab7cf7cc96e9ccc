// kavach/src/honeypot/persona.rs
//
// Honeypot reply generator. Persona follows the conversation stage; the
// LLM writes the reply when configured, canned responses otherwise. A
// too-short reply falls through to the next rung of the fallback chain.

use crate::clients::llm::LlmClient;

const MIN_REPLY_LEN: usize = 20;

const SAFETY_REPLY: &str =
    "Sorry, I am little confused about all this. My nephew usually helps me \
     with phone things and he is not here right now. Can you explain once \
     more slowly what exactly I have to do and why?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Confused,
    Worried,
    Questioning,
    Cooperative,
    Stalling,
}

impl Stage {
    pub fn for_message_count(count: usize) -> Self {
        match count {
            0..=2 => Self::Confused,
            3..=4 => Self::Worried,
            5..=6 => Self::Questioning,
            7..=10 => Self::Cooperative,
            _ => Self::Stalling,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Confused    => "confused",
            Self::Worried     => "worried",
            Self::Questioning => "questioning",
            Self::Cooperative => "cooperative",
            Self::Stalling    => "stalling",
        }
    }

    fn canned(&self) -> &'static [&'static str] {
        match self {
            Self::Confused => &[
                "Sorry, who is this? I did not understand what you are saying about my account.",
                "I am not understanding this properly. Which bank are you calling from?",
                "What is this message about? I have not done any transaction today.",
                "Hello, I think you may have the wrong number. What account are you talking about?",
            ],
            Self::Worried => &[
                "Oh no, is something wrong with my account? I am very worried now, please tell me what happened.",
                "This sounds serious. Will my money be safe? What should I do first?",
                "I am getting tensed. My salary just got credited, nothing will happen to it no?",
                "Please tell me clearly, is my account really blocked? I need it for my daughter's fees.",
            ],
            Self::Questioning => &[
                "Before I do anything, can you tell me your employee ID and which branch you are from?",
                "Why is the bank asking like this on chat? Usually they send letter or email no?",
                "How did you get my number? And what is this charge you are talking about exactly?",
                "My friend said banks never ask such things. Can you explain why this is different?",
            ],
            Self::Cooperative => &[
                "Okay okay, I am trying to do what you said but my phone is very slow today. What was the step after opening the app?",
                "I am ready to do it, but the app is asking for so many things. Tell me again which option to press?",
                "Fine, I will cooperate. But first the OTP has not come yet, network is bad in my area. Can you wait?",
                "Yes I opened the page you sent. It is loading very slowly. What should I see after it opens?",
            ],
            Self::Stalling => &[
                "My phone battery is about to die, let me put it for charging and message you after some time.",
                "I have guests at home right now. Can we do this in one hour? Please do not close my account till then.",
                "The app is showing some error and asking to update. It is downloading very slowly, please wait.",
                "I pressed something and the screen went off. Now it is asking me to login again. So much trouble!",
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct HoneypotReply {
    pub reply:      String,
    pub agent_note: String,
}

pub async fn generate(
    scammer_message: &str,
    history_tail: &[String],
    message_count: usize,
    llm: Option<&LlmClient>,
) -> HoneypotReply {
    let stage = Stage::for_message_count(message_count);
    let agent_note = format!(
        "Engaging with {} persona at message {}",
        stage.label(),
        message_count
    );

    if let Some(llm) = llm {
        if let Some(reply) = llm
            .honeypot_reply(scammer_message, history_tail, stage.label())
            .await
        {
            if reply.len() >= MIN_REPLY_LEN {
                return HoneypotReply { reply, agent_note };
            }
        }
    }

    // Canned fallback — rotate deterministically through the stage's list.
    let canned = stage.canned();
    let reply = canned[message_count % canned.len()];
    let reply = if reply.len() >= MIN_REPLY_LEN { reply } else { SAFETY_REPLY };

    HoneypotReply { reply: reply.to_string(), agent_note }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_progression_follows_message_count() {
        assert_eq!(Stage::for_message_count(1), Stage::Confused);
        assert_eq!(Stage::for_message_count(2), Stage::Confused);
        assert_eq!(Stage::for_message_count(3), Stage::Worried);
        assert_eq!(Stage::for_message_count(5), Stage::Questioning);
        assert_eq!(Stage::for_message_count(8), Stage::Cooperative);
        assert_eq!(Stage::for_message_count(11), Stage::Stalling);
        assert_eq!(Stage::for_message_count(50), Stage::Stalling);
    }

    #[tokio::test]
    async fn canned_replies_meet_minimum_length() {
        for count in 0..20 {
            let r = generate("send money now", &[], count, None).await;
            assert!(r.reply.len() >= MIN_REPLY_LEN);
            assert!(r.agent_note.contains("persona"));
        }
    }

    #[tokio::test]
    async fn rotation_varies_replies_within_stage() {
        let a = generate("pay now", &[], 7, None).await;
        let b = generate("pay now", &[], 8, None).await;
        assert_ne!(a.reply, b.reply);
    }
}
