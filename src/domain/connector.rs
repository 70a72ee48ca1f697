// ==========================================
// POS 导入系统 - 收银连接器配置
// ==========================================
// 职责: 描述某一收银系统的解析器类型与映射规则
// 用途: 导入作业创建时选定,开票时读取映射
// ==========================================

use crate::domain::types::ParserKind;
use serde::{Deserialize, Serialize};

/// 源编码 → 物料映射
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMapping {
    pub source_code: String,
    pub item_code: String,
    pub uom: Option<String>,
}

/// 源编码 → 收款方式映射
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMapping {
    pub source_code: String,
    pub source_name: String,
    pub mode_of_payment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosConnector {
    pub connector_id: String,
    pub connector_name: String,
    pub parser_kind: ParserKind,
    pub company: String,
    pub currency: String,
    pub default_customer: String,
    pub default_income_account: String,
    pub default_tax_account: Option<String>,
    pub default_unmapped_item: Option<String>,
    pub create_draft_invoices: bool,
    pub enabled: bool,
    pub item_mappings: Vec<ItemMapping>,
    pub payment_mappings: Vec<PaymentMapping>,
}

impl PosConnector {
    /// Restomax 默认连接器（含三种标准收款映射）
    pub fn restomax_defaults(
        company: &str,
        default_customer: &str,
        income_account: &str,
        tax_account: Option<&str>,
    ) -> Self {
        let payment_mappings = [
            ("580000", "Cash", "Cash"),
            ("580100", "Carte bancaire", "Bank Draft"),
            ("580200", "Ticket Restaurant", "Bank Draft"),
        ]
        .iter()
        .map(|(code, name, mode)| PaymentMapping {
            source_code: code.to_string(),
            source_name: name.to_string(),
            mode_of_payment: mode.to_string(),
        })
        .collect();

        Self {
            connector_id: "RESTOMAX".to_string(),
            connector_name: "Restomax".to_string(),
            parser_kind: ParserKind::Restomax,
            company: company.to_string(),
            currency: "EUR".to_string(),
            default_customer: default_customer.to_string(),
            default_income_account: income_account.to_string(),
            default_tax_account: tax_account.map(str::to_string),
            default_unmapped_item: Some("POS-OTHER".to_string()),
            create_draft_invoices: false,
            enabled: true,
            item_mappings: Vec::new(),
            payment_mappings,
        }
    }

    pub fn item_mapping(&self, source_code: &str) -> Option<&ItemMapping> {
        self.item_mappings.iter().find(|m| m.source_code == source_code)
    }

    /// 物料编码: 映射优先,否则回落到默认未映射物料
    pub fn item_for_source_code(&self, source_code: &str) -> Option<&str> {
        self.item_mapping(source_code)
            .map(|m| m.item_code.as_str())
            .or(self.default_unmapped_item.as_deref())
    }

    pub fn mode_of_payment_for_source_code(&self, source_code: &str) -> Option<&str> {
        self.payment_mappings
            .iter()
            .find(|m| m.source_code == source_code)
            .map(|m| m.mode_of_payment.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_falls_back_to_default_unmapped() {
        let mut connector = PosConnector::restomax_defaults("ACME", "Client", "706000", None);
        connector.item_mappings.push(ItemMapping {
            source_code: "FOOD".to_string(),
            item_code: "POS-FOOD".to_string(),
            uom: None,
        });

        assert_eq!(connector.item_for_source_code("FOOD"), Some("POS-FOOD"));
        assert_eq!(connector.item_for_source_code("???"), Some("POS-OTHER"));

        connector.default_unmapped_item = None;
        assert_eq!(connector.item_for_source_code("???"), None);
    }

    #[test]
    fn test_default_payment_mappings() {
        let connector = PosConnector::restomax_defaults("ACME", "Client", "706000", None);
        assert_eq!(connector.mode_of_payment_for_source_code("580000"), Some("Cash"));
        assert_eq!(
            connector.mode_of_payment_for_source_code("580200"),
            Some("Bank Draft")
        );
        assert_eq!(connector.mode_of_payment_for_source_code("999"), None);
    }
}
