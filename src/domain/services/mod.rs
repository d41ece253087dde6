mod command_translator;

pub use command_translator::{encode_command, format_score, CommandTranslator, TranslatorOptions};
