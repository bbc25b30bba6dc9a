/// Which of the two views is in front
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Vision,
    Aion,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Vision => "vision",
            Mode::Aion => "aion",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "vision" => Some(Mode::Vision),
            "aion" | "chat" => Some(Mode::Aion),
            _ => None,
        }
    }

    pub fn all() -> Vec<Mode> {
        vec![Mode::Vision, Mode::Aion]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Mode::Vision => "VISION",
            Mode::Aion => "AION",
        }
    }

    pub fn toggle(&self) -> Self {
        match self {
            Mode::Vision => Mode::Aion,
            Mode::Aion => Mode::Vision,
        }
    }
}
