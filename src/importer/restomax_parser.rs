// ==========================================
// POS 导入系统 - Restomax 导出解析器
// ==========================================
// 输入: Restomax 会计分录导出 (CSV / Excel)
// 列: N° Z, Date clôture, ID Restomax, Compte général, Description, TVA, DEBIT, CREDIT
// 规则:
// - 700xxx = 营业额 (CREDIT - DEBIT), 451xxx = 实收增值税, 580xxx = 收款 (DEBIT - CREDIT)
// - Restomax 导出所有金额均为两倍,需除以 2
// - 导出存在重复行,需去重
// ==========================================

use crate::domain::report::{
    ParsedFile, PosLine, PosPayment, PosReport, SkippedReport, StructuralError, VatAmount,
};
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::parser_trait::{FileParser, ReportParser, TabularRecord, TabularSheet};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

pub const COL_REPORT_NUMBER: &str = "N° Z";
pub const COL_CLOSE_DATE: &str = "Date clôture";
pub const COL_SOURCE_ID: &str = "ID Restomax";
pub const COL_ACCOUNT: &str = "Compte général";
pub const COL_DESCRIPTION: &str = "Description";
pub const COL_VAT_RATE: &str = "TVA";
pub const COL_DEBIT: &str = "DEBIT";
pub const COL_CREDIT: &str = "CREDIT";

const REQUIRED_COLUMNS: [&str; 6] = [
    COL_REPORT_NUMBER,
    COL_CLOSE_DATE,
    COL_ACCOUNT,
    COL_DEBIT,
    COL_CREDIT,
    COL_SOURCE_ID,
];

const REVENUE_ACCOUNT_PREFIX: &str = "700";
const VAT_ACCOUNT_PREFIX: &str = "451";
const PAYMENT_ACCOUNT_PREFIX: &str = "580";

/// 营业额汇总行关键字（小写匹配）
const REVENUE_SUMMARY_KEYWORDS: [&str; 6] = [
    "total",
    "sous-total",
    "subtotal",
    "ca global",
    "ca tvac",
    "ca hors",
];

pub const SUMMARY_ONLY_REASON: &str = "无营业额明细行（仅汇总行）";

/// 单张报表的累积数据
struct ReportAccumulator {
    report_number: String,
    date_raw: String,
    first_line: usize,
    lines: Vec<PosLine>,
    vat: BTreeMap<Decimal, Decimal>,
    payments: Vec<PosPayment>,
    errors: Vec<String>,
}

impl ReportAccumulator {
    fn new(report_number: &str, record: &TabularRecord) -> Self {
        Self {
            report_number: report_number.to_string(),
            date_raw: record.get(COL_CLOSE_DATE).to_string(),
            first_line: record.line,
            lines: Vec::new(),
            vat: BTreeMap::new(),
            payments: Vec::new(),
            errors: Vec::new(),
        }
    }
}

// ==========================================
// RestomaxParser
// ==========================================
pub struct RestomaxParser {
    file_parser: Box<dyn FileParser>,
    cleaner: DataCleaner,
}

impl Default for RestomaxParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RestomaxParser {
    pub fn new() -> Self {
        Self::with_file_parser(Box::new(UniversalFileParser))
    }

    pub fn with_file_parser(file_parser: Box<dyn FileParser>) -> Self {
        Self {
            file_parser,
            cleaner: DataCleaner,
        }
    }

    /// 校验表头
    fn validate_headers(&self, sheet: &TabularSheet) -> ImportResult<()> {
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|col| !sheet.headers.iter().any(|h| h == col))
            .collect();

        if !missing.is_empty() {
            return Err(ImportError::format(
                "表头",
                format!("缺少列: {}", missing.join(", ")),
            ));
        }
        if sheet.records.is_empty() {
            return Err(ImportError::format("文件", "文件为空（无数据行）"));
        }
        Ok(())
    }

    /// 解析金额单元格,失败时记录结构错误并按 0 处理
    fn amount(&self, record: &TabularRecord, column: &str, errors: &mut Vec<String>) -> Decimal {
        match self.cleaner.parse_number(record.get(column)) {
            Ok(v) => v,
            Err(raw) => {
                errors.push(format!(
                    "第 {} 行: {} 无法解析为数字 '{}'",
                    record.line, column, raw
                ));
                Decimal::ZERO
            }
        }
    }

    /// 将表格内容解析为报表序列
    pub fn parse_sheet(&self, sheet: &TabularSheet) -> ImportResult<ParsedFile> {
        self.validate_headers(sheet)?;

        let mut order: Vec<String> = Vec::new();
        let mut reports: HashMap<String, ReportAccumulator> = HashMap::new();
        let mut seen_lines: HashSet<(String, String, String, String, String)> = HashSet::new();

        for record in &sheet.records {
            let report_number = self.cleaner.clean_text(record.get(COL_REPORT_NUMBER));
            if report_number.is_empty() {
                continue;
            }

            let account = self.cleaner.clean_text(record.get(COL_ACCOUNT));
            let source_id = self.cleaner.clean_text(record.get(COL_SOURCE_ID));
            let original_description = self.cleaner.clean_text(record.get(COL_DESCRIPTION));
            let description = if original_description.is_empty() {
                "Others".to_string()
            } else {
                original_description.clone()
            };

            let line_key = (
                report_number.clone(),
                account.clone(),
                original_description.clone(),
                self.cleaner.clean_text(record.get(COL_DEBIT)),
                self.cleaner.clean_text(record.get(COL_CREDIT)),
            );
            if !seen_lines.insert(line_key) {
                continue;
            }

            if !reports.contains_key(&report_number) {
                order.push(report_number.clone());
                reports.insert(
                    report_number.clone(),
                    ReportAccumulator::new(&report_number, record),
                );
            }
            let acc = match reports.get_mut(&report_number) {
                Some(acc) => acc,
                None => continue,
            };

            let debit = self.amount(record, COL_DEBIT, &mut acc.errors);
            let credit = self.amount(record, COL_CREDIT, &mut acc.errors);
            let tva_rate = self.amount(record, COL_VAT_RATE, &mut acc.errors);
            let description_lower = original_description.to_lowercase();

            if account.starts_with(REVENUE_ACCOUNT_PREFIX) {
                if REVENUE_SUMMARY_KEYWORDS
                    .iter()
                    .any(|k| description_lower.contains(k))
                {
                    continue;
                }

                let net = (credit - debit) / Decimal::TWO;
                if net > Decimal::ZERO {
                    let net = net.round_dp(2);
                    acc.lines.push(PosLine {
                        source_code: if source_id.is_empty() {
                            description.clone()
                        } else {
                            source_id
                        },
                        description,
                        net_amount: net,
                        tax_rate: tva_rate,
                        tax_amount: Decimal::ZERO,
                        gross_amount: net,
                    });
                }
            } else if account.starts_with(VAT_ACCOUNT_PREFIX) {
                if description_lower.contains("total") || source_id.is_empty() {
                    continue;
                }

                let amount = (credit - debit) / Decimal::TWO;
                if !amount.is_zero() {
                    *acc.vat.entry(tva_rate).or_insert(Decimal::ZERO) += amount;
                }
            } else if account.starts_with(PAYMENT_ACCOUNT_PREFIX) {
                if original_description.starts_with("Total CA")
                    || original_description.starts_with("Total PAIEMENT")
                {
                    continue;
                }

                let amount = (debit - credit) / Decimal::TWO;
                if amount > Decimal::ZERO {
                    acc.payments.push(PosPayment {
                        source_code: if source_id.is_empty() {
                            description.clone()
                        } else {
                            source_id
                        },
                        source_name: description,
                        amount: amount.round_dp(2),
                    });
                }
            }
        }

        // 无营业额明细的报表不入行集合; 其余组装后按 (日期, 报表号) 排序
        let mut parsed = ParsedFile::default();
        let mut built: Vec<(PosReport, Vec<String>)> = Vec::with_capacity(order.len());
        for acc in order.iter().filter_map(|number| reports.remove(number)) {
            // 有解析错误的空报表保留为结构错误行
            if acc.lines.is_empty() && acc.errors.is_empty() {
                debug!(report_number = %acc.report_number, line = acc.first_line, "报表仅含汇总行,跳过");
                parsed.skipped_reports.push(SkippedReport {
                    report_number: acc.report_number,
                    source_line: acc.first_line,
                    reason: SUMMARY_ONLY_REASON.to_string(),
                });
                continue;
            }
            built.push(self.finish_report(acc));
        }
        built.sort_by(|(a, _), (b, _)| {
            (a.report_date, &a.report_number).cmp(&(b.report_date, &b.report_number))
        });

        for (index, (report, errors)) in built.into_iter().enumerate() {
            for message in errors {
                debug!(index, report_number = %report.report_number, %message, "结构错误");
                parsed.structural_errors.push(StructuralError { index, message });
            }
            parsed.rows.push(report);
        }

        Ok(parsed)
    }

    fn finish_report(&self, mut acc: ReportAccumulator) -> (PosReport, Vec<String>) {
        let report_date = self.cleaner.parse_date(&acc.date_raw);
        if report_date.is_none() {
            acc.errors.insert(
                0,
                format!("第 {} 行: 收银日期无法解析 '{}'", acc.first_line, acc.date_raw),
            );
        }

        if acc.lines.is_empty() {
            acc.errors.push(SUMMARY_ONLY_REASON.to_string());
        }

        let report = PosReport {
            report_number: acc.report_number,
            report_date,
            source_line: acc.first_line,
            lines: acc.lines,
            payments: acc.payments,
            vat_by_rate: acc
                .vat
                .into_iter()
                .map(|(rate, amount)| VatAmount {
                    rate,
                    amount: amount.round_dp(2),
                })
                .collect(),
        };

        (report, acc.errors)
    }
}

impl ReportParser for RestomaxParser {
    fn parse(&self, file_path: &Path) -> ImportResult<ParsedFile> {
        let sheet = self.file_parser.read_sheet(file_path)?;
        let parsed = self.parse_sheet(&sheet)?;

        info!(
            file = %file_path.display(),
            records = sheet.records.len(),
            reports = parsed.rows.len(),
            structural_errors = parsed.structural_errors.len(),
            skipped = parsed.skipped_reports.len(),
            "Restomax 文件解析完成"
        );
        Ok(parsed)
    }
}
