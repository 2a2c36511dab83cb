//! Localized confirmation text for tool results and host status lines.
//!
//! Everything here is data. The executor and the host pick a string by
//! language; nothing branches on the content.

use crate::language::Language;

pub fn task_added(language: Language, title: &str) -> String {
    match language {
        Language::It => format!("Attività \"{}\" aggiunta alla lista.", title),
        Language::En => format!("Task \"{}\" added to your list.", title),
    }
}

pub fn appointment_scheduled(language: Language, title: &str) -> String {
    match language {
        Language::It => format!("Appuntamento \"{}\" programmato.", title),
        Language::En => format!("Appointment \"{}\" scheduled.", title),
    }
}

pub fn file_generated(language: Language, filename: &str) -> String {
    match language {
        Language::It => format!("File \"{}\" generato con successo.", filename),
        Language::En => format!("File \"{}\" generated successfully.", filename),
    }
}

pub fn file_generated_notice(language: Language) -> &'static str {
    match language {
        Language::It => "File generato!",
        Language::En => "File generated!",
    }
}

pub fn connection_error(language: Language) -> &'static str {
    match language {
        Language::It => "Errore di connessione",
        Language::En => "Connection error",
    }
}

pub fn status_line(language: Language, state: crate::conversation::ConversationState) -> &'static str {
    use crate::conversation::ConversationState::*;
    match language {
        Language::En => match state {
            Connecting => "Connecting...",
            Idle => "Speak naturally",
            Listening => "Listening...",
            Processing => "Thinking...",
            Speaking => "Speaking...",
            Error => "Connection error",
        },
        Language::It => match state {
            Connecting => "Connessione...",
            Idle => "Parla naturalmente",
            Listening => "Ascolto...",
            Processing => "Sto pensando...",
            Speaking => "Sto parlando...",
            Error => "Errore di connessione",
        },
    }
}
