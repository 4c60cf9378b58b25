//! The study dialogue: ask for a nickname, fetch a pasuk, then talk through
//! each Rashi on it.

use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde_json::Value;
use tracing::{info, warn};

use chavruta_core::convo::{
    hook_fn, response_fn, CallbackError, Command, Conversation, ConversationStatus, ConvoContext,
    Dialogue, DialogueBuilder, DialogueError, Handler, InboundMessage, MessageSink, Pattern,
    QuestionOptions, ResponseCallback,
};
use chavruta_core::domain::user::{UserId, UserRecord};
use chavruta_db::UserRepository;
use chavruta_slack::mrkdwn::{code_block, slackify_html};

use crate::lookup::{Commentary, TextLookup};

pub const ASK_NAME: &str = "askName";
pub const CONFIRM_NAME: &str = "confirmName";
pub const ASK_PASUK: &str = "askPasuk";
pub const CONFIRM_TEXT: &str = "confirmText";
pub const NEW_RASHI: &str = "newRashi";
pub const RASHI_LOOP: &str = "rashiLoop";
pub const MORE_TO_SAY: &str = "moreToSay";

pub const COMPLETED_TEXT: &str = "OK! Thanks for learning with me!";
pub const ABORTED_TEXT: &str = "OK, sorry to bother you!";

const FIRST_PROMPTS: &[&str] =
    &["Tell me more", "thats so interesting! Go on.", "Can you explain that a little more?"];
const THINKING_PROMPTS: &[&str] =
    &["What makes you think that?", "Do you really think so?", "But you are not sure?"];
const RETRY_PROMPTS: &[&str] = &[
    "Tell me more",
    "Please go on.",
    "Can you explain that a little more?",
    "I'm not sure I understand you fully",
    "Can you think of another answer to this question?",
];

pub fn build_study_dialogue(
    lookup: Arc<dyn TextLookup>,
    users: Arc<dyn UserRepository>,
) -> Result<Dialogue, DialogueError> {
    let mut builder = DialogueBuilder::new();

    builder.add_question(
        "Ok {{vars.nickname}}, what pasuk do you want to learn today?",
        vec![Handler::fallback(FindPasuk { lookup })],
        QuestionOptions::keyed("reference"),
        ASK_PASUK,
    )?;

    builder.add_question(
        "This text?",
        vec![
            Handler::yes(response_fn(|_, convo| start_rashis(convo))),
            Handler::no(response_fn(|_, convo| {
                convo.say("ok sorry!");
                Ok(Command::goto(ASK_PASUK))
            })),
            Handler::fallback(response_fn(|_, _| Ok(Command::Repeat))),
        ],
        QuestionOptions::default(),
        CONFIRM_TEXT,
    )?;

    builder.register_before_hook(
        NEW_RASHI,
        hook_fn(|convo| {
            let current = current_rashi(convo)?;
            convo.set_var("curHeRashi", slackify_html(&current.he));
            convo.set_var("curEnRashi", slackify_html(&current.text));
            Ok(())
        }),
    )?;
    builder.add_question(
        "```{{ vars.curEnRashi }}``` \n ```{{ vars.curHeRashi }}```\nWhat's bothering me about this pasuk?",
        vec![Handler::fallback(response_fn(|_, convo| {
            convo.set_var("rashiLoopCount", 0);
            convo.set_var("nextQuestion", pick(FIRST_PROMPTS));
            Ok(Command::goto(RASHI_LOOP))
        }))],
        QuestionOptions::default(),
        NEW_RASHI,
    )?;

    builder.register_before_hook(
        RASHI_LOOP,
        hook_fn(|convo| {
            let count = convo.vars().get_i64("rashiLoopCount").unwrap_or(0);
            convo.set_var("rashiLoopCount", count + 1);
            Ok(())
        }),
    )?;
    let thinking = Pattern::regex(r"^(.+think.+|.+wonder.+)")
        .map_err(|error| DialogueError::invalid_pattern(RASHI_LOOP, &error))?;
    builder.add_question(
        "{{vars.nextQuestion}}",
        vec![
            Handler::new(
                thinking,
                response_fn(|_, convo| {
                    convo.set_var("nextQuestion", pick(THINKING_PROMPTS));
                    Ok(Command::goto(RASHI_LOOP))
                }),
            ),
            Handler::fallback(response_fn(|_, convo| {
                if convo.vars().get_i64("rashiLoopCount").unwrap_or(0) > 0 {
                    return Ok(Command::goto(MORE_TO_SAY));
                }
                convo.set_var("nextQuestion", pick(RETRY_PROMPTS));
                Ok(Command::goto(RASHI_LOOP))
            })),
        ],
        QuestionOptions::default(),
        RASHI_LOOP,
    )?;

    builder.add_question(
        "Do you have anything else you want to add?",
        vec![
            Handler::yes(response_fn(|_, convo| {
                convo.set_var("nextQuestion", "Go on...");
                Ok(Command::goto(RASHI_LOOP))
            })),
            Handler::no(response_fn(|_, convo| next_rashi(convo))),
            Handler::fallback(response_fn(|_, _| Ok(Command::Repeat))),
        ],
        QuestionOptions::default(),
        MORE_TO_SAY,
    )?;

    builder.add_question(
        "Who am I learning with today?",
        vec![Handler::fallback(response_fn(|_, convo| {
            convo.add_message("Great.");
            Ok(Command::goto(CONFIRM_NAME))
        }))],
        QuestionOptions::keyed("nickname"),
        ASK_NAME,
    )?;

    builder.register_before_hook(
        CONFIRM_NAME,
        hook_fn(|convo| {
            let name = convo.extract_response("nickname").unwrap_or_default().trim().to_owned();
            convo.set_var("nickname", name);
            Ok(())
        }),
    )?;
    builder.add_question(
        "You want me to call you `{{vars.nickname}}`?",
        vec![
            Handler::yes(RememberNickname { users }),
            Handler::no(response_fn(|_, convo| {
                convo.say("ok sorry!");
                Ok(Command::Stop)
            })),
            Handler::fallback(response_fn(|_, _| Ok(Command::Repeat))),
        ],
        QuestionOptions::default(),
        CONFIRM_NAME,
    )?;

    Ok(builder.build())
}

/// Builds a study session for the user behind `origin`, greeting by stored
/// nickname when there is one, and attaches the farewell listener.
pub fn study_conversation(
    dialogue: Arc<Dialogue>,
    origin: &InboundMessage,
    user: Option<&UserRecord>,
    sink: Arc<dyn MessageSink>,
) -> (Conversation, &'static str, String) {
    let mut convo = Conversation::for_message(dialogue, origin, Arc::clone(&sink));
    let channel_id = origin.channel_id.clone();
    convo.on_end(move |report| {
        let text = farewell(report.status);
        tokio::spawn(async move {
            if let Err(error) = sink.send_text(&channel_id, text).await {
                warn!(
                    event_name = "bot.study.farewell_failed",
                    channel_id = %channel_id,
                    error = %error,
                    "failed to send farewell"
                );
            }
        });
    });

    match user.and_then(UserRecord::nickname) {
        Some(name) => {
            convo.set_var("nickname", name);
            (convo, ASK_PASUK, format!("Hello {name}!"))
        }
        None => (convo, ASK_NAME, "Hello.".to_owned()),
    }
}

pub fn farewell(status: ConversationStatus) -> &'static str {
    match status {
        ConversationStatus::Completed => COMPLETED_TEXT,
        _ => ABORTED_TEXT,
    }
}

struct FindPasuk {
    lookup: Arc<dyn TextLookup>,
}

#[async_trait]
impl ResponseCallback for FindPasuk {
    async fn on_response(
        &self,
        response: &InboundMessage,
        convo: &mut ConvoContext,
    ) -> Result<Command, CallbackError> {
        convo.say("Ok, one second, let me find that one.");

        let record = match self.lookup.lookup(&response.text).await {
            Ok(record) if !record.is_empty() => record,
            Ok(_) => {
                info!(
                    event_name = "bot.study.pasuk_not_found",
                    session_id = %convo.session_id,
                    reference = %response.text,
                    "lookup returned no text"
                );
                convo.say("I am having trouble finding that one.");
                return Ok(Command::Repeat);
            }
            Err(error) => {
                warn!(
                    event_name = "bot.study.lookup_failed",
                    session_id = %convo.session_id,
                    reference = %response.text,
                    error = %error,
                    "text lookup failed"
                );
                convo.say("I am having trouble finding that one.");
                return Ok(Command::Repeat);
            }
        };

        if let Some(reference) = &record.reference {
            convo.set_var("ref", reference.as_str());
        }
        convo.set_var("rashis", to_value(&record.rashis())?);

        let shown = format!(
            "{}\n{}",
            code_block(&slackify_html(&record.text)),
            code_block(&slackify_html(&record.he))
        );
        Ok(Command::transition(CONFIRM_TEXT, shown))
    }
}

struct RememberNickname {
    users: Arc<dyn UserRepository>,
}

#[async_trait]
impl ResponseCallback for RememberNickname {
    async fn on_response(
        &self,
        _response: &InboundMessage,
        convo: &mut ConvoContext,
    ) -> Result<Command, CallbackError> {
        if let Some(name) = convo.vars().get_str("nickname").filter(|name| !name.is_empty()) {
            let record = UserRecord { id: UserId(convo.user_id.clone()), name: Some(name.to_owned()) };
            if let Err(error) = self.users.save(record).await {
                warn!(
                    event_name = "bot.study.nickname_not_saved",
                    session_id = %convo.session_id,
                    user_id = %convo.user_id,
                    error = %error,
                    "failed to persist nickname"
                );
            }
        }

        convo.say("Great!");
        Ok(Command::goto(ASK_PASUK))
    }
}

fn start_rashis(convo: &mut ConvoContext) -> Result<Command, CallbackError> {
    let rashis: Vec<Commentary> = match convo.vars().get("rashis") {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|error| CallbackError::new(format!("rashis are malformed: {error}")))?,
        None => Vec::new(),
    };
    let mut rashis = rashis.into_iter();

    let Some(first) = rashis.next() else {
        convo.say("I have nothing to say about that pasuk.");
        return Ok(Command::goto(ASK_PASUK));
    };
    let remaining = rashis.collect::<Vec<_>>();
    let statement = match remaining.len() + 1 {
        1 => "I have one thought on this pasuk",
        2 => "I have a couple of things to say about this pasuk.",
        _ => "I have so many things to say about this pasuk.",
    };

    convo.set_var("curRashi", to_value(&first)?);
    convo.set_var("RashiArray", to_value(&remaining)?);
    Ok(Command::transition(NEW_RASHI, statement))
}

fn next_rashi(convo: &mut ConvoContext) -> Result<Command, CallbackError> {
    let mut remaining: Vec<Commentary> = match convo.vars().get("RashiArray") {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|error| CallbackError::new(format!("RashiArray is malformed: {error}")))?,
        None => Vec::new(),
    };
    if remaining.is_empty() {
        return Ok(Command::Continue);
    }

    let current = remaining.remove(0);
    convo.set_var("curRashi", to_value(&current)?);
    convo.set_var("RashiArray", to_value(&remaining)?);
    Ok(Command::transition(NEW_RASHI, "Well I have more to say on the pasuk."))
}

fn current_rashi(convo: &ConvoContext) -> Result<Commentary, CallbackError> {
    let value = convo
        .vars()
        .get("curRashi")
        .cloned()
        .ok_or_else(|| CallbackError::new("no current Rashi to discuss"))?;
    serde_json::from_value(value)
        .map_err(|error| CallbackError::new(format!("curRashi is malformed: {error}")))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, CallbackError> {
    serde_json::to_value(value).map_err(|error| CallbackError::new(error.to_string()))
}

fn pick(options: &[&'static str]) -> &'static str {
    options.choose(&mut rand::thread_rng()).copied().unwrap_or("Tell me more")
}
