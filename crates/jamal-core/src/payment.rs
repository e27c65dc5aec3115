//! Driver payouts (`pagamentos`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::driver::DriverId;
use crate::error::CoreError;

pub type PaymentId = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[default]
    #[serde(rename = "pendente")]
    Pending,
    #[serde(rename = "processando")]
    Processing,
    #[serde(rename = "pago")]
    Paid,
    #[serde(rename = "cancelado")]
    Cancelled,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Paid,
        PaymentStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pendente",
            PaymentStatus::Processing => "processando",
            PaymentStatus::Paid => "pago",
            PaymentStatus::Cancelled => "cancelado",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "payment status",
                value: s.to_string(),
            })
    }
}

/// Aggregated payout for one driver over one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    #[serde(rename = "motorista_id")]
    pub driver_id: DriverId,
    #[serde(rename = "motorista_nome")]
    pub driver_name: String,
    #[serde(rename = "total_corridas")]
    pub ride_count: i64,
    #[serde(rename = "valor_bruto")]
    pub gross: f64,
    #[serde(rename = "comissao_app")]
    pub commission: f64,
    #[serde(rename = "valor_liquido")]
    pub net: f64,
    #[serde(rename = "data_inicio")]
    pub period_start: DateTime<Utc>,
    #[serde(rename = "data_fim")]
    pub period_end: DateTime<Utc>,
    #[serde(default)]
    pub status: PaymentStatus,
    #[serde(rename = "data_pagamento", default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(rename = "metodo_pagamento", default)]
    pub method: Option<String>,
    #[serde(rename = "observacoes", default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn from_new(id: PaymentId, new: NewPayment) -> Self {
        Self {
            id,
            driver_id: new.driver_id,
            driver_name: new.driver_name,
            ride_count: new.ride_count,
            gross: new.gross,
            commission: new.commission,
            net: new.net,
            period_start: new.period_start,
            period_end: new.period_end,
            status: new.status,
            paid_at: None,
            method: None,
            notes: None,
            created_at: Some(Utc::now()),
        }
    }

    pub fn apply(&mut self, patch: &PaymentPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if patch.paid_at.is_some() {
            self.paid_at = patch.paid_at;
        }
        if patch.method.is_some() {
            self.method = patch.method.clone();
        }
        if patch.notes.is_some() {
            self.notes = patch.notes.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPayment {
    #[serde(rename = "motorista_id")]
    pub driver_id: DriverId,
    #[serde(rename = "motorista_nome")]
    pub driver_name: String,
    #[serde(rename = "total_corridas")]
    pub ride_count: i64,
    #[serde(rename = "valor_bruto")]
    pub gross: f64,
    #[serde(rename = "comissao_app")]
    pub commission: f64,
    #[serde(rename = "valor_liquido")]
    pub net: f64,
    #[serde(rename = "data_inicio")]
    pub period_start: DateTime<Utc>,
    #[serde(rename = "data_fim")]
    pub period_end: DateTime<Utc>,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PaymentStatus>,
    #[serde(rename = "data_pagamento", default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(rename = "metodo_pagamento", default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(rename = "observacoes", default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip_through_str() {
        for status in PaymentStatus::ALL {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("paid".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn row_parses_wire_names() {
        let json = r#"{
            "id": 1, "motorista_id": 3, "motorista_nome": "Roberto Oliveira",
            "total_corridas": 12, "valor_bruto": 300.0, "comissao_app": 45.0,
            "valor_liquido": 255.0, "data_inicio": "2026-02-01T00:00:00Z",
            "data_fim": "2026-02-28T23:59:59Z", "status": "processando"
        }"#;
        let p: Payment = serde_json::from_str(json).unwrap();
        assert_eq!(p.status, PaymentStatus::Processing);
        assert_eq!(p.net, 255.0);
        assert!(p.paid_at.is_none());
    }
}
