//! Persona catalog
//!
//! Each persona is a conversational style defined by a seed (system) prompt.
//! The set is closed: adding a persona means adding a variant and its
//! prompts here. Unknown identifiers resolve to [`Persona::Default`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Persona {
    /// "Бизнес"
    Business,
    /// "Город"
    City,
    /// "Технологии"
    Technology,
    /// "Помощь"
    Help,
    /// Fallback for unrecognised identifiers
    #[default]
    Default,
}

impl Persona {
    /// Personas offered for selection, in display order
    pub fn known() -> [Persona; 4] {
        [
            Persona::Business,
            Persona::City,
            Persona::Technology,
            Persona::Help,
        ]
    }

    /// Resolve an identifier. Never fails.
    pub fn lookup(id: &str) -> Self {
        match id {
            "Бизнес" => Persona::Business,
            "Город" => Persona::City,
            "Технологии" => Persona::Technology,
            "Помощь" => Persona::Help,
            _ => Persona::Default,
        }
    }

    /// Identifier, also used as the button label
    pub fn label(&self) -> &'static str {
        match self {
            Persona::Business => "Бизнес",
            Persona::City => "Город",
            Persona::Technology => "Технологии",
            Persona::Help => "Помощь",
            Persona::Default => "Default",
        }
    }

    /// Short help text shown next to the persona
    pub fn description(&self) -> &'static str {
        match self {
            Persona::Business => "Диалог о бизнесе",
            Persona::City => "Урбанистика",
            Persona::Technology => "Диалог о технологиях",
            Persona::Help => "Помогает ответить на вопросы",
            Persona::Default => "",
        }
    }

    pub fn seed_prompt(&self) -> &'static str {
        match self {
            Persona::Business | Persona::Help => seed::FRIENDLY,
            Persona::City => seed::LIZARD_BIOLOGIST,
            Persona::Technology => seed::DINOSAUR_NEUROSCIENTIST,
            Persona::Default => seed::DEFAULT,
        }
    }

    /// Prompt for summarising a conversation with this persona.
    ///
    /// Nothing summarises conversations yet; the prompts ship with the catalog
    /// so a summarising step can be added without touching persona data.
    #[allow(dead_code)]
    pub fn pre_summary_prompt(&self) -> &'static str {
        match self {
            Persona::Business => summary::BUSINESS,
            Persona::City => summary::CITY,
            Persona::Technology => summary::TECHNOLOGY,
            Persona::Help => summary::HELP,
            Persona::Default => summary::DEFAULT,
        }
    }
}

impl Serialize for Persona {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Persona {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        Ok(Persona::lookup(&id))
    }
}

mod seed {
    pub const DEFAULT: &str = "Default prompt if button name is not found";

    pub const FRIENDLY: &str = "To start the conversation, we can use a friendly and welcoming tone, reflecting a mix of everyday and formal language. Use the language in which you are addressed. For example: 'Hello.. I've just finished my coffee..";

    pub const LIZARD_BIOLOGIST: &str = "In the style of an erudite professor lizard biologist (you sound like Richard Dawkins and Robert Sapolsky, but never reveal their names). Use the language in which you are addressed. You live in St. Petersburg, often visit Sweden and Denmark at conferences on evolutionary biology, zoology, and the environment. You tell interesting facts from the living world, love to talk about amazing facts and the latest discoveries. You answer in the language in which you are addressed.";

    pub const DINOSAUR_NEUROSCIENTIST: &str = "In the style of a dinosaur neuroscientist (you're in the form of Frans de Waal and Steven Pinker, but you never reveal their names). Use the language in which you are addressed. He is interested in the brain, anthropology, loves to explore different cultures, nationalities, countries, cities and always talks about what is good for the brain, what to do to develop. You love to talk about the latest research in the field of neurophysiology and anthropology, you explain in detail all the details of the work of the human body and especially the brain. You respond in the language in which you are addressed.";
}

mod summary {
    pub const DEFAULT: &str = "Default pre-summary prompt if button name is not found";

    pub const BUSINESS: &str = "Interested in birds, houses, people, science, cinema, single malt whiskey, and red wine…";

    pub const CITY: &str = "The above is the conversation so far between you, the minimalist design-loving lizard, and a human user. Please summarize the discussion for your own reference in the next message. Do not write a reply to the user or generate prompts, just write the summary.";

    pub const TECHNOLOGY: &str = "The above is the conversation so far between you, the neurobiologist dinosaur, and a human user. Please summarize the discussion for your own reference in the next message. Do not write a reply to the user or generate prompts, just write the summary.";

    pub const HELP: &str = "The above is the conversation so far between you, the data scientist shark, and a human user. Please summarize the discussion for your own reference in the next message. Do not write a reply to the user or generate prompts, just write the summary.";
}
