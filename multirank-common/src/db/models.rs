//! Database models

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Categoria {
    pub categoria_code: String,
    pub orden: i64,
    pub nombre: String,
    pub objetivo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Item {
    pub item_id: i64,
    pub orden: i64,
    pub codigo_visible: String,
    pub contenido: String,
    pub parent_item_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rol {
    pub rol_id: i64,
    pub nombre: String,
    pub peso: i64,
}

/// Evaluation lifecycle status. `draft` evaluations are editable by their
/// owner; `submitted` ones only by an admin (who may also reopen them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalStatus {
    Draft,
    Submitted,
}

impl EvalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvalStatus::Draft => "draft",
            EvalStatus::Submitted => "submitted",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "submitted" => EvalStatus::Submitted,
            _ => EvalStatus::Draft,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Evaluacion {
    pub evaluacion_id: i64,
    pub instrumento_id: i64,
    pub usuario_id: i64,
    pub rol_id_snapshot: i64,
    pub rol_peso_snapshot: i64,
    pub status: String,
    pub submitted_at: Option<NaiveDateTime>,
}

impl Evaluacion {
    pub fn status(&self) -> EvalStatus {
        EvalStatus::from_str(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_status_round_trip() {
        assert_eq!(EvalStatus::from_str("draft"), EvalStatus::Draft);
        assert_eq!(EvalStatus::from_str("submitted"), EvalStatus::Submitted);
        assert_eq!(EvalStatus::Draft.as_str(), "draft");
        assert_eq!(EvalStatus::Submitted.as_str(), "submitted");
    }

    #[test]
    fn unknown_status_defaults_to_draft() {
        assert_eq!(EvalStatus::from_str("bogus"), EvalStatus::Draft);
    }
}
