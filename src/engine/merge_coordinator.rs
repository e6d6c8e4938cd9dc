// ==========================================
// 多源表格对账合并引擎 - 合并协调器
// ==========================================
// 职责: 把次级来源（回复/报告/其他）合并进基准表
// 流程:
// - 类别按 response → report → other 顺序串行处理
// - 类别内每个文件一个任务，提交到工作池并发执行
// - 等待类别全部任务：超时只记录日志，然后继续等待
// - 任一任务失败 → 整张工作表失败
// ==========================================
// 单文件任务:
// - 解析工作表 → 宽松模式读取（required_fields）→ 计算主键
// - 主键不在基准表 → 丢弃；否则列映射后在行锁内写入
// - 非回退表读到 0 行数据 → 依次尝试全部有效回退表
// ==========================================

use crate::config::ReconConfig;
use crate::domain::rule::MappingTable;
use crate::domain::source::{file_name_of, KeyedSupplement, SheetRequirement, SourceCategory};
use crate::engine::baseline_loader::BaselineTable;
use crate::engine::worker_pool::{flatten_join, WorkerPool};
use crate::error::{MergeError, ReconResult};
use crate::importer::column_extractor::ColumnExtractor;
use crate::importer::inventory::SourceInventory;
use crate::importer::row_reader::{RequiredMode, RowReader};
use crate::importer::sheet_resolver::SheetResolver;
use crate::importer::workbook::{CellAccess, SourceWorkbook};
use crate::progress::ProgressSink;
use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

// ==========================================
// 统计结构（写入运行报告）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileMergeStats {
    pub file: String,
    pub category: Option<SourceCategory>,
    /// 实际读取的工作表（含回退表），未解析时为 None
    pub worksheet: Option<String>,
    pub used_fallback: bool,
    pub rows_read: usize,
    pub matched: usize,
    pub unmatched: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SheetRowCounts {
    pub rows_read: usize,
    pub matched: usize,
    pub unmatched: usize,
}

impl SheetRowCounts {
    fn absorb(&mut self, other: &SheetRowCounts) {
        self.rows_read += other.rows_read;
        self.matched += other.matched;
        self.unmatched += other.unmatched;
    }
}

// ==========================================
// MergeCoordinator
// ==========================================
pub struct MergeCoordinator {
    pool: WorkerPool,
    config: Arc<ReconConfig>,
    requirement: Arc<SheetRequirement>,
    table: Arc<BaselineTable>,
    progress: Arc<dyn ProgressSink>,
}

impl MergeCoordinator {
    pub fn new(
        pool: WorkerPool,
        config: Arc<ReconConfig>,
        requirement: Arc<SheetRequirement>,
        table: Arc<BaselineTable>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            pool,
            config,
            requirement,
            table,
            progress,
        }
    }

    /// 按固定顺序合并全部次级类别
    pub async fn merge_all(&self, inventory: &SourceInventory) -> ReconResult<Vec<FileMergeStats>> {
        let mut all_stats = Vec::new();
        for category in SourceCategory::MERGE_ORDER {
            let files: Vec<PathBuf> = inventory
                .by_category(category)
                .into_iter()
                .map(|f| f.path.clone())
                .collect();
            all_stats.extend(self.merge_category(category, files).await?);
        }
        Ok(all_stats)
    }

    /// 合并单个类别（文件并发）
    #[instrument(skip(self, files), fields(sheet = %self.requirement.sheet_name, files = files.len()))]
    pub async fn merge_category(
        &self,
        category: SourceCategory,
        mut files: Vec<PathBuf>,
    ) -> ReconResult<Vec<FileMergeStats>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        files.sort();
        info!(%category, "开始合并类别");

        let handles: Vec<_> = files
            .into_iter()
            .map(|path| {
                let label = file_name_of(&path);
                let config = Arc::clone(&self.config);
                let requirement = Arc::clone(&self.requirement);
                let table = Arc::clone(&self.table);
                let progress = Arc::clone(&self.progress);
                let handle = self.pool.spawn(label.clone(), move || {
                    let result = merge_file(&path, category, &requirement, &config, &table);
                    progress.advance();
                    result
                });
                (label, handle)
            })
            .collect();

        let (labels, handles): (Vec<String>, Vec<_>) = handles.into_iter().unzip();
        let results = self.wait_category(category, join_all(handles)).await;

        let mut stats = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (label, joined) in labels.iter().zip(results) {
            match flatten_join(label, joined) {
                Ok(Ok(file_stats)) => stats.push(file_stats),
                Ok(Err(e)) => {
                    warn!(file = %label, error = %e, "合并任务失败");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    warn!(file = %label, error = %e, "合并任务异常");
                    first_error.get_or_insert(e.into());
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        let matched: usize = stats.iter().map(|s| s.matched).sum();
        info!(%category, matched, "类别合并完成");
        Ok(stats)
    }

    /// 有界等待：超时仅记录，然后继续等待
    async fn wait_category<F>(&self, category: SourceCategory, all: F) -> F::Output
    where
        F: std::future::Future,
    {
        let wait = self.config.settings.category_wait;
        let started = Instant::now();
        tokio::pin!(all);
        loop {
            match tokio::time::timeout(wait, &mut all).await {
                Ok(output) => return output,
                Err(_) => warn!(
                    %category,
                    waited_secs = started.elapsed().as_secs(),
                    "类别任务等待超时，继续等待"
                ),
            }
        }
    }

    /// 合并外部补充数据（作为一个额外的次级类别）
    ///
    /// 补充数据的关键字段决定匹配复合主键的哪一段；每条字段集按列映射规则提取。
    /// 映射表优先级: 补充数据自带 → email_mapping → 同名恒等映射
    pub fn merge_supplement(&self, supplement: &KeyedSupplement) -> ReconResult<SheetRowCounts> {
        let position = self
            .requirement
            .key_position(&supplement.key_field)
            .ok_or_else(|| MergeError::UnknownSupplementKey(supplement.key_field.clone()))?;

        let identity;
        let mapping = match supplement.mapping.as_ref().or(self.config.supplement.as_ref()) {
            Some(mapping) => mapping,
            None => {
                let mut names: Vec<&str> = supplement
                    .entries
                    .values()
                    .flat_map(|fields| fields.keys().map(String::as_str))
                    .collect();
                names.sort_unstable();
                identity = MappingTable::identity(names);
                &identity
            }
        };

        let mut counts = SheetRowCounts::default();
        let mut entries: Vec<_> = supplement.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        for (key_value, fields) in entries {
            counts.rows_read += 1;
            let keys = self.table.keys_with_part(position, key_value);
            if keys.is_empty() {
                counts.unmatched += 1;
                debug!(key_field = %supplement.key_field, value = %key_value, "补充数据未找到匹配项");
                continue;
            }

            let update = ColumnExtractor::extract(fields, mapping)?;
            for key in keys {
                self.table.merge_into(key, update.clone())?;
                counts.matched += 1;
            }
        }

        info!(
            sheet = %self.requirement.sheet_name,
            key_field = %supplement.key_field,
            matched = counts.matched,
            "补充数据合并完成"
        );
        Ok(counts)
    }
}

/// 单文件合并（在工作池阻塞线程中执行）
pub fn merge_file(
    path: &Path,
    category: SourceCategory,
    requirement: &SheetRequirement,
    config: &ReconConfig,
    table: &BaselineTable,
) -> ReconResult<FileMergeStats> {
    let file_name = file_name_of(path);
    let mut stats = FileMergeStats {
        file: file_name.clone(),
        category: Some(category),
        ..Default::default()
    };

    let mut workbook = SourceWorkbook::open(path)?;
    let Some(resolved) = SheetResolver::resolve(&mut workbook, requirement, &file_name)? else {
        return Ok(stats);
    };
    stats.worksheet = Some(resolved.name.clone());
    stats.used_fallback = resolved.is_fallback;

    let mapping = config.table_for(category);
    let mut counts = merge_grid(&resolved.grid, requirement, config, mapping, table)?;

    if counts.rows_read == 0 && !resolved.is_fallback {
        let mut found_data = false;
        for fallback in SheetResolver::valid_fallbacks(&mut workbook, requirement)? {
            info!(file = %file_name, fallback = %fallback.name, "使用回退表");
            let fallback_counts = merge_grid(&fallback.grid, requirement, config, mapping, table)?;
            found_data |= fallback_counts.rows_read > 0;
            counts.absorb(&fallback_counts);
        }
        if found_data {
            stats.used_fallback = true;
        } else {
            info!(file = %file_name, sheet = %requirement.sheet_name, "工作表及回退表均无数据");
        }
    }

    stats.rows_read = counts.rows_read;
    stats.matched = counts.matched;
    stats.unmatched = counts.unmatched;
    debug!(
        file = %file_name,
        rows = stats.rows_read,
        matched = stats.matched,
        unmatched = stats.unmatched,
        "文件合并完成"
    );
    Ok(stats)
}

fn merge_grid(
    grid: &dyn CellAccess,
    requirement: &SheetRequirement,
    config: &ReconConfig,
    mapping: &MappingTable,
    table: &BaselineTable,
) -> ReconResult<SheetRowCounts> {
    let mut counts = SheetRowCounts::default();
    let reader = RowReader::new(
        grid,
        &requirement.required_fields,
        RequiredMode::Lenient,
        config.settings.empty_row_limit,
    );

    for row in reader {
        counts.rows_read += 1;
        let key = requirement.key_of(&row)?;
        if !table.contains(&key) {
            counts.unmatched += 1;
            debug!(key = %key, "未找到匹配项，跳过更新");
            continue;
        }
        let fields = ColumnExtractor::extract(&row, mapping)?;
        table.merge_into(&key, fields)?;
        counts.matched += 1;
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;
    use crate::domain::cell::CellValue;
    use crate::domain::rule::{FixedMapping, Rule};
    use crate::domain::source::{CompositeKey, DestRow, SourceRow};
    use crate::error::ReconError;
    use crate::progress::NoopProgress;
    use std::fs;

    fn config() -> ReconConfig {
        let mut response = MappingTable::new();
        response.push("ETA", Rule::new("eta"));
        let mut report = MappingTable::new();
        report.push("STATUS", Rule::new("status"));
        ReconConfig {
            requirements: vec![],
            fixed: FixedMapping::new(),
            baseline: MappingTable::new(),
            response,
            report,
            document: None,
            supplement: None,
            document_key: None,
            settings: EngineSettings::default(),
        }
    }

    fn requirement() -> SheetRequirement {
        SheetRequirement {
            sheet_name: "Sheet1".to_string(),
            key_fields: vec!["PO".to_string()],
            required_fields: vec![],
            fallback_sheets: vec![],
        }
    }

    fn table(keys: &[&str]) -> BaselineTable {
        let mut table = BaselineTable::new();
        for k in keys {
            table.insert(CompositeKey::new([*k]), DestRow::new());
        }
        table
    }

    fn coordinator(table: BaselineTable) -> MergeCoordinator {
        MergeCoordinator::new(
            WorkerPool::new(4),
            Arc::new(config()),
            Arc::new(requirement()),
            Arc::new(table),
            Arc::new(NoopProgress),
        )
    }

    #[test]
    fn test_merge_file_matches_and_drops_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resp.csv");
        fs::write(&path, "PO,ETA\nP1,2026-01-01\nP9,2026-02-02\n").unwrap();

        let table = table(&["P1"]);
        let stats = merge_file(&path, SourceCategory::Response, &requirement(), &config(), &table).unwrap();

        assert_eq!(stats.rows_read, 2);
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.unmatched, 1);
        let row = table.row(&CompositeKey::new(["P1"])).unwrap().unwrap();
        assert_eq!(row.get("eta"), Some(&CellValue::text("2026-01-01")));
        assert!(table.row(&CompositeKey::new(["P9"])).unwrap().is_none());
    }

    #[test]
    fn test_report_uses_report_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rep.csv");
        fs::write(&path, "PO,ETA,STATUS\nP1,2026-01-01,SHIPPED\n").unwrap();

        let table = table(&["P1"]);
        merge_file(&path, SourceCategory::Report, &requirement(), &config(), &table).unwrap();

        let row = table.row(&CompositeKey::new(["P1"])).unwrap().unwrap();
        assert_eq!(row.get("status"), Some(&CellValue::text("SHIPPED")));
        assert!(row.get("eta").is_none());
    }

    #[test]
    fn test_malformed_key_fails_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resp.csv");
        fs::write(&path, "ORDER,ETA\nP1,2026-01-01\n").unwrap();

        let result = merge_file(&path, SourceCategory::Response, &requirement(), &config(), &table(&["P1"]));
        assert!(matches!(result, Err(ReconError::Validation(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_category_error_fails_whole_category() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.csv");
        let bad = dir.path().join("b.csv");
        fs::write(&good, "PO,ETA\nP1,2026-01-01\n").unwrap();
        fs::write(&bad, "ORDER,ETA\nP1,2026-01-01\n").unwrap();

        let coordinator = coordinator(table(&["P1"]));
        let result = coordinator
            .merge_category(SourceCategory::Response, vec![good, bad])
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_supplement_by_key_part() {
        let mut base = BaselineTable::new();
        base.insert(CompositeKey::new(["F1", "P1"]), DestRow::new());
        base.insert(CompositeKey::new(["F2", "P1"]), DestRow::new());
        base.insert(CompositeKey::new(["F2", "P2"]), DestRow::new());

        let coordinator = MergeCoordinator::new(
            WorkerPool::new(1),
            Arc::new(config()),
            Arc::new(SheetRequirement {
                key_fields: vec!["folder".to_string(), "po".to_string()],
                ..requirement()
            }),
            Arc::new(base),
            Arc::new(NoopProgress),
        );

        let mut supplement = KeyedSupplement::new("po");
        let mut fields = SourceRow::new();
        fields.insert("vessel".to_string(), CellValue::text("EVER GIVEN"));
        fields.insert("remark".to_string(), CellValue::Empty);
        supplement.insert("P1", fields);
        supplement.insert("P7", SourceRow::new());

        let counts = coordinator.merge_supplement(&supplement).unwrap();
        assert_eq!(counts.matched, 2);
        assert_eq!(counts.unmatched, 1);

        let row = coordinator
            .table
            .row(&CompositeKey::new(["F2", "P1"]))
            .unwrap()
            .unwrap();
        assert_eq!(row.get("vessel"), Some(&CellValue::text("EVER GIVEN")));
        assert!(row.get("remark").is_none());

        let unknown = KeyedSupplement::new("lot");
        assert!(matches!(
            coordinator.merge_supplement(&unknown),
            Err(ReconError::Merge(MergeError::UnknownSupplementKey(_)))
        ));
    }

    fn write_book(path: &Path, sheets: &[(&str, &[&[&str]])]) {
        let mut book = rust_xlsxwriter::Workbook::new();
        for (name, rows) in sheets {
            let sheet = book.add_worksheet();
            sheet.set_name(*name).unwrap();
            for (r, row) in rows.iter().enumerate() {
                for (c, value) in row.iter().enumerate() {
                    sheet.write_string(r as u32, c as u16, *value).unwrap();
                }
            }
        }
        book.save(path).unwrap();
    }

    fn requirement_with_fallback() -> SheetRequirement {
        SheetRequirement {
            sheet_name: "CREATED".to_string(),
            fallback_sheets: vec!["Sheet1".to_string()],
            ..requirement()
        }
    }

    #[test]
    fn test_empty_exact_sheet_retries_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resp.xlsx");
        write_book(
            &path,
            &[
                ("CREATED", &[&["PO", "ETA"]]),
                ("Sheet1", &[&["PO", "ETA"], &["P1", "2026-04-01"]]),
            ],
        );

        let table = table(&["P1"]);
        let stats = merge_file(
            &path,
            SourceCategory::Response,
            &requirement_with_fallback(),
            &config(),
            &table,
        )
        .unwrap();

        assert_eq!(stats.worksheet.as_deref(), Some("CREATED"));
        assert!(stats.used_fallback);
        assert_eq!(stats.rows_read, 1);
        assert_eq!(stats.matched, 1);
        let row = table.row(&CompositeKey::new(["P1"])).unwrap().unwrap();
        assert_eq!(row.get("eta"), Some(&CellValue::text("2026-04-01")));
    }

    #[test]
    fn test_empty_exact_sheet_and_empty_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resp.xlsx");
        write_book(
            &path,
            &[("CREATED", &[&["PO", "ETA"]]), ("Sheet1", &[&["PO", "ETA"]])],
        );

        let table = table(&["P1"]);
        let stats = merge_file(
            &path,
            SourceCategory::Response,
            &requirement_with_fallback(),
            &config(),
            &table,
        )
        .unwrap();

        assert!(!stats.used_fallback);
        assert_eq!(stats.rows_read, 0);
        let row = table.row(&CompositeKey::new(["P1"])).unwrap().unwrap();
        assert!(row.get("eta").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_category_wait_timeout_does_not_cancel() {
        let mut settings = EngineSettings::default();
        settings.category_wait = std::time::Duration::from_millis(5);
        let coordinator = MergeCoordinator::new(
            WorkerPool::new(1),
            Arc::new(ReconConfig {
                settings,
                ..config()
            }),
            Arc::new(requirement()),
            Arc::new(table(&["P1"])),
            Arc::new(NoopProgress),
        );

        let handle = coordinator.pool.spawn("slow.xlsx", || {
            std::thread::sleep(std::time::Duration::from_millis(60));
            42
        });
        let joined = coordinator
            .wait_category(SourceCategory::Response, handle)
            .await;
        assert_eq!(flatten_join("slow.xlsx", joined).unwrap(), 42);
    }

    #[test]
    fn test_supplement_runs_through_mapping_rules() {
        let mut email = MappingTable::new();
        email.push(
            "ETA",
            Rule {
                splitter: Some(" ".to_string()),
                index: Some(1),
                ..Rule::new("eta")
            },
        );
        email.push(
            "WEIGHT",
            Rule {
                method: Some(crate::domain::rule::Method::Round),
                dp: 1,
                ..Rule::new("weight")
            },
        );
        email.push(
            "REMARK",
            Rule {
                consider_empty: true,
                ..Rule::new("remark")
            },
        );

        let mut base = BaselineTable::new();
        let mut seeded = DestRow::new();
        seeded.insert("remark".to_string(), CellValue::text("old"));
        base.insert(CompositeKey::new(["P1"]), seeded);

        let coordinator = MergeCoordinator::new(
            WorkerPool::new(1),
            Arc::new(ReconConfig {
                supplement: Some(email),
                ..config()
            }),
            Arc::new(requirement()),
            Arc::new(base),
            Arc::new(NoopProgress),
        );

        let mut supplement = KeyedSupplement::new("PO");
        let mut fields = SourceRow::new();
        fields.insert("ETA".to_string(), CellValue::text("2026-01-05 10:00"));
        fields.insert("WEIGHT".to_string(), CellValue::text("12.34"));
        fields.insert("REMARK".to_string(), CellValue::text(""));
        fields.insert("IGNORED".to_string(), CellValue::text("x"));
        supplement.insert("P1", fields);

        let counts = coordinator.merge_supplement(&supplement).unwrap();
        assert_eq!(counts.matched, 1);

        let row = coordinator
            .table
            .row(&CompositeKey::new(["P1"]))
            .unwrap()
            .unwrap();
        assert_eq!(row.get("eta"), Some(&CellValue::text("2026-01-05")));
        assert_eq!(row.get("weight"), Some(&CellValue::Number(12.3)));
        assert_eq!(row.get("remark"), Some(&CellValue::text("")));
        assert!(row.get("IGNORED").is_none());
    }

    #[test]
    fn test_attached_mapping_overrides_email_mapping() {
        let mut email = MappingTable::new();
        email.push("vessel", Rule::new("email_vessel"));

        let coordinator = MergeCoordinator::new(
            WorkerPool::new(1),
            Arc::new(ReconConfig {
                supplement: Some(email),
                ..config()
            }),
            Arc::new(requirement()),
            Arc::new(table(&["P1"])),
            Arc::new(NoopProgress),
        );

        let mut fields = SourceRow::new();
        fields.insert("vessel".to_string(), CellValue::text("EVER GIVEN"));
        let mut supplement =
            KeyedSupplement::new("PO").with_mapping(MappingTable::identity(["vessel"]));
        supplement.insert("P1", fields);

        coordinator.merge_supplement(&supplement).unwrap();
        let row = coordinator
            .table
            .row(&CompositeKey::new(["P1"]))
            .unwrap()
            .unwrap();
        assert_eq!(row.get("vessel"), Some(&CellValue::text("EVER GIVEN")));
        assert!(row.get("email_vessel").is_none());
    }
}
