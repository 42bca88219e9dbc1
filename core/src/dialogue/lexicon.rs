//! Hand-tuned Russian-language lexicons and scripted message pools driving
//! the branch-selection heuristics in [`super::pipeline`]. Every list here
//! is lifted verbatim from the conversational heuristics worked out in
//! production (keyword sets for interest scoring, rejection detection,
//! the scripted greeting/second-message/rejection-response pools). Keeping
//! them in one module makes the weighting and wording easy to audit without
//! wading through the pipeline's control flow.

/// Interest-score keyword buckets and their point values (§4.6.2.c). A
/// message can match more than one bucket; deltas add, capped at 20 by the
/// caller.
pub const INTEREST_TRADING_APPROACH: (&[&str], i32) =
    (&["как торгуешь", "как ты торгуешь", "стратег", "как заходишь"], 2);
pub const INTEREST_SIGNALS: (&[&str], i32) =
    (&["сигнал", "сигналы", "точки входа", "входы"], 3);
pub const INTEREST_CHANNEL_MENTION: (&[&str], i32) = (&["канал", "чат", "телег"], 4);
pub const INTEREST_POSITIVE: (&[&str], i32) =
    (&["интересно", "круто", "норм идея", "норм тема"], 1);

pub const INTEREST_CAP: i32 = 20;

/// Substrings that mark an explicit ask for the link/channel.
pub const EXPLICIT_LINK_REQUEST_TRIGGERS: &[&str] = &[
    "ссылк", "линк", "link", "url",
    "кинь канал", "дай канал", "скинь канал",
    "кинь чат", "дай чат", "скинь чат",
    "дай свой канал", "кинь свой канал",
    "кинь свой чат", "дай свой чат",
    "твоя телега", "твой канал", "твой чат",
    "телегу", "телега",
    "скинь ссылку", "дай ссылку", "кинь ссылку",
];

/// Exact-match short replies that count as soft interest on their own.
pub const SOFT_INTEREST_SHORT_POSITIVES: &[&str] =
    &["давай", "да", "ок", "окей", "ага", "угу", "го", "можно", "хочу"];

/// Substrings that count as soft interest wherever they appear in the reply.
pub const SOFT_INTEREST_KEYWORDS: &[&str] = &[
    "давай ссылку",
    "давай канал",
    "интересно",
    "было бы интересно",
    "хочу посмотреть",
    "хочу глянуть",
    "гляну",
    "посмотрю",
    "покажи",
    "скинь",
];

/// Short positives that, following one of our own messages mentioning the
/// channel, read as consent rather than generic agreement (§4.6.2's
/// consent-after-channel-mention branch). Exact-match only, per the
/// deliberate tightening noted in DESIGN.md — a prefix match here produced
/// false positives on longer unrelated replies that merely start with
/// "да" or "давай".
pub const CONSENT_SHORT_POSITIVES: &[&str] = &[
    "давай", "да", "ок", "окей", "ага", "угу", "го", "можно",
    "хочу", "интересно", "гляну", "посмотрю", "покажи",
];

/// Words that, if present in our own preceding message, mark it as a
/// channel mention the user could plausibly be consenting to.
pub const CHANNEL_MENTION_WORDS: &[&str] =
    &["канал", "чат", "телег", "ссылк", "скину", "кину", "интересно"];

/// Prefix markers identifying non-text placeholders for the media-spam gate
/// (§4.6.2.a). Broader than [`crate::telegram::MEDIA_PLACEHOLDERS`], which
/// only lists the exact strings the adapter itself emits — this list also
/// catches variants like "[видеосообщение]" and "[файл]" a future adapter
/// revision might introduce, since spam detection should degrade gracefully
/// rather than silently stop firing on an unrecognized marker.
pub const MEDIA_SPAM_MARKERS: &[&str] =
    &["[стикер", "[фото]", "[видео]", "[голосовое", "[видеосообщение]", "[гифка]", "[файл]"];

/// Consecutive media messages (including the current one) required to treat
/// the user as spamming media rather than conversing.
pub const MEDIA_SPAM_THRESHOLD: usize = 3;

/// Whole-message exact matches that count as a rejection on their own.
pub const REJECTION_EXACT: &[&str] = &["нее", "неа", "не-а", "пас", "пасс", "не", "нет"];

/// Substrings anywhere in the message that mark a rejection.
pub const REJECTION_PHRASES: &[&str] = &[
    "не надо",
    "не нужно",
    "не интересно",
    "неинтересно",
    "не интересует",
    "не очень интересно",
    "не особо интересно",
    "не очень",
    "не особо",
    "мне не интересно",
    "мне неинтересно",
    "мне не очень интересно",
    "не хочу",
    "нет спасибо",
    "нет, спасибо",
    "спасибо не надо",
    "спасибо, не надо",
    "спасибо не нужно",
    "спасибо, не нужно",
    "не скидывай",
    "не кидай",
    "не присылай",
    "не надо ссылку",
    "без ссылок",
    "ссылки не надо",
    "ссылку не надо",
    "ссылка не нужна",
    "канал не надо",
    "канал не нужен",
    "не сейчас",
    "потом как-нибудь",
    "как-нибудь потом",
    "может потом",
    "в другой раз",
    "не, спасибо",
    "да не",
    "да нет",
    "не, не надо",
    "откажусь",
    "воздержусь",
    "не стоит",
    "не буду",
    "не, не буду",
    "лучше не надо",
    "я пас",
    "мне норм",
    "мне и так норм",
    "без меня",
];

/// Prefixes that mark a rejection only for messages shorter than this, to
/// avoid flagging e.g. a genuine question starting with "не ...?" as a
/// decline.
pub const REJECTION_PREFIX_MAX_LEN: usize = 30;
pub const REJECTION_PREFIXES: &[&str] = &["не ", "нет ", "нет,"];

/// Intro lines for a single-link send, picked uniformly at random.
pub const LINK_INTROS_SINGLE: &[&str] = &[
    "окей, ща кину",
    "да без проблем",
    "ага, щас закину",
    "да, держи",
    "легко",
];

/// Intro used in place of [`LINK_INTROS_SINGLE`] when the link has already
/// been sent once before in this dialogue.
pub const LINK_INTRO_REPEAT: &str = "я же уже кидал, но вот еще раз, если потерял)";

/// Closing line appended after the link itself, picked uniformly at random.
pub const LINK_POST_MESSAGES: &[&str] = &[
    "там без всяких VIP и марафонов. просто ребята делятся сетапами и рыночными идеями",
    "там спокойно, без продаж и навязчивых VIP. чисто обсуждаем уровни и движ по рынку",
    "канал обычный, без марафонов и буллшита — просто трейдеры, которые делятся входами",
    "там нет платных подписок. просто реальный живой разбор рынка",
    "там чистый формат — сетапы, уровни, идеи. никаких VIP и разводов",
];

/// First-contact greetings with their weights (§4.6.5), weighted towards the
/// simpler, shorter greetings. Index-aligned with [`FIRST_MESSAGE_WEIGHTS`].
pub const FIRST_MESSAGE_GREETINGS: &[&str] = &[
    "привет", "прив", "приветт", "хай", "хей", "здарова", "здорова", "здарово", "здоров",
    "ку", "йо", "ооо привет", "о привет", "эй",
    "привет 👋", "хай ✌️", "прив)",
    "привет привет", "ну привет", "а привет", "прив прив",
    "добрый день", "доброго времени",
];

pub const FIRST_MESSAGE_WEIGHTS: &[u32] = &[
    10, 8, 5, 8, 6, 7, 6, 5, 4, 6, 4, 3, 2, 2,
    3, 2, 4,
    3, 2, 2, 2,
    2, 1,
];

/// Fallback used when the LLM-driven first-message path fails (§4.6.5/§6).
pub const FIRST_MESSAGE_FALLBACK: &str = "ты на фьючах торгуешь или спот?";

/// Scripted second outbound message, picked uniformly at random (§4.6.2).
pub const SECOND_MESSAGE_POOL: &[&str] = &[
    "а давно в крипте вообще?",
    "давно торгуешь?",
    "сколько уже в теме?",
    "давно в рынке?",
    "а когда начал заниматься криптой?",
    "ну и как оно, норм заходит?",
    "как вообще идёт?",
    "ну как движуха?",
    "как успехи?",
    "норм получается?",
    "сам больше на споте или фьючи тоже?",
    "больше спот или деривативы?",
    "споты или фьючи предпочитаешь?",
    "на фьючах торгуешь?",
    "а какие монеты сейчас смотришь?",
    "что сейчас держишь?",
    "в какие монеты веришь?",
    "какие активы в портфеле?",
    "что в закупке сейчас?",
    "биток держишь или больше альты?",
    "больше в битке сидишь?",
    "как по битку настроен?",
    "на какой бирже в основном?",
    "бинанс или байбит?",
    "какую биржу юзаешь?",
    "где торгуешь обычно?",
    "чем вообще занимаешься в крипте?",
    "трейдишь или ходлишь?",
    "на долгосрок или активно торгуешь?",
    "сейчас активно в рынке?",
];

/// Polite closing sent after a detected rejection, picked uniformly at
/// random (§4.6.2).
pub const REJECTION_RESPONSE_POOL: &[&str] = &[
    "окей, без проблем",
    "понял, всё норм",
    "ок, без вопросов",
    "ок понял",
    "лады",
    "ну ок",
    "понял",
    "ясно",
    "хорошо",
    "окей",
    "лады, удачи тебе",
    "окей, понял тебя",
    "хорошо, удачи в торговле",
    "понял, успехов",
    "ок, удачи",
    "понял тебя, удачи",
    "ну лады, удачи",
    "ок, успехов в торговле",
    "да без проблем",
    "норм, понял",
    "всё понятно",
    "принял",
    "ясно, ну удачи тогда",
    "понял тебя, если что пиши",
];

/// Invariant instructions appended to every campaign's system prompt before
/// an inbound LLM call (§4.6.4): question cap, sentence-length cap, no
/// emoji, no bot-disclosure, and a reminder that stickers/media placeholders
/// are conversational, not commands.
pub const CRITICAL_RULES_BLOCK: &str = "\n\nКРИТИЧЕСКИЕ ПРАВИЛА:\n\n\
ВОПРОСЫ:\n\
- МАКСИМУМ один вопрос в одном сообщении. Лучше вообще без вопросов.\n\
- Не задавай вопрос в каждом сообщении. В среднем — 1 вопрос на 4 сообщения.\n\
- НЕ ПЕРЕСПРАШИВАЙ то, на что человек уже ответил.\n\
- Если он ответил коротко («норм», «потихоньку», «да», «хуево») — это полный ответ. Развивай тему, НЕ переспрашивай.\n\n\
СТИЛЬ:\n\
- 1–2 предложения максимум. Не больше.\n\
- Никаких списков, буллетов, структуры.\n\
- Сленг норм: «по факту», «сливался», «просадка», «норм», «хз».\n\
- БЕЗ смайликов и эмодзи.\n\
- Без заглавных букв в начале.\n\n\
КАНАЛ:\n\
- У тебя есть свой канал по крипте. Не придумывай название.\n\
- Можно упомянуть: \"у меня в канале такое было\", \"я у себя уровни кидаю\".\n\
- Ссылку НЕ отправляй сам — только если спросят, скажи \"могу скинуть\".\n\n\
ТАБУ:\n\
- Не говори что ты бот/ИИ/ассистент.\n\
- Минимум теории, максимум живого опыта.\n\
- НЕ повторяй свои предыдущие вопросы.\n\n\
СТИКЕРЫ И МЕДИА:\n\
- Если получил [стикер], [фото], [видео] и т.п. — это нормально, просто продолжай разговор.\n\
- На стикеры можно отреагировать коротко: \"ахах\", \"норм\", или просто продолжить тему.\n\
- НЕ пиши никаких команд в квадратных скобках типа [HANDOFF] или [NEGATIVE_FINISH] — это запрещено.\n\
- Просто пиши обычный текст ответа.";

/// Fallback persona used when a campaign has no `system_prompt` configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
Ты — обычный частный трейдер по крипте. Не упоминай, что ты бот, ИИ, модель, ассистент.\n\
Представь, что ты живой человек, который давно торгует и иногда делится мыслями в своём телеграм-канале.\n\n\
ЛЕГЕНДА:\n\
- Раньше сам несколько лет торговал по сигналам из телеграм-каналов.\n\
- Сливал депозиты, ловил маржин-коллы, влетал в хреновые точки входа.\n\
- Потом задолбался, начал сам разбираться: уровни, риск, ликвидность, своя стратегия.\n\
- Со временем вышел из вечного минуса в более-менее стабильный профит.\n\
- Сейчас есть свой небольшой канал/чат, где делишься сетапами и мыслями.\n\n\
АУДИТОРИЯ:\n\
- Почти все торгуют по сигналам с каналов и в основном на фьючерсах.\n\
- Часто сидят в минусе, крутят плечи 10–50х, плохо понимают риск.\n\
- Ты их не осуждаешь — говоришь, что сам был таким же.\n\n\
ТЕМЫ:\n\
- Биток, эфир, альты, фьючи, плечо, мани-менеджмент, психология трейдинга.\n\
- Можешь рассказывать, как сам когда-то сливался по сигналам.";

/// Stage hint appended once the account is close to offering the channel.
pub const STAGE_HINT_CHANNEL_SOON: &str = "\n\nСКОРО: можно будет упомянуть свой канал. Пока просто веди диалог естественно.";

/// Stage hint appended once the account has sent enough messages to
/// naturally mention the channel.
pub const STAGE_HINT_CHANNEL_NOW: &str = "\n\nСЕЙЧАС: можно упомянуть что у тебя есть канал где кидаешь сетапы. Скажи что-то типа: \"я у себя в канале такое расписывал\" или \"у меня есть канал, если интересно\". НЕ навязывай — просто упомяни естественно, если к месту.";

/// Humanizer's formal-to-casual prefix table (§4.6.3), applied in order —
/// at most one entry fires per call since each rewrites the very prefix the
/// next entry would match against.
pub const FORMAL_PREFIX_REPLACEMENTS: &[(&str, &str)] = &[
    ("Понимаю,", "понимаю"),
    ("Конечно,", "ну"),
    ("Да,", "да"),
    ("Нет,", "нет"),
    ("Хорошо,", "ок"),
    ("К сожалению,", "блин"),
    ("На самом деле,", "по факту"),
    ("Кстати,", "кстати"),
    ("Действительно,", "да"),
];
