// ==========================================
// 多源表格对账合并引擎 - 单据扫描
// ==========================================
// 职责: 对 documents/ 下的单据并发执行定向扫描
// 输出: {文件名（不含扩展名）: 字段}，即 KeyedSupplement
// ==========================================

use crate::config::{ReconConfig, RunLayout};
use crate::domain::rule::MappingTable;
use crate::domain::source::{file_name_of, KeyedSupplement, SourceRow};
use crate::engine::worker_pool::{flatten_join, WorkerPool};
use crate::error::ReconResult;
use crate::importer::directional_extractor::DirectionalExtractor;
use crate::importer::inventory::list_supported_files;
use crate::importer::workbook::SourceWorkbook;
use futures::future::join_all;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// 并发扫描多个文件（各取第一个工作表）
pub async fn scan_files(
    pool: &WorkerPool,
    files: Vec<PathBuf>,
    table: Arc<MappingTable>,
) -> ReconResult<HashMap<String, SourceRow>> {
    let (labels, handles): (Vec<String>, Vec<_>) = files
        .into_iter()
        .map(|path| {
            let label = file_name_of(&path);
            let table = Arc::clone(&table);
            let handle = pool.spawn(label.clone(), move || scan_file(&path, &table));
            (label, handle)
        })
        .unzip();

    let mut scanned = HashMap::new();
    for (label, joined) in labels.iter().zip(join_all(handles).await) {
        let (stem, fields) = flatten_join(label, joined)??;
        debug!(file = %label, fields = fields.len(), "单据扫描完成");
        scanned.insert(stem, fields);
    }
    Ok(scanned)
}

fn scan_file(path: &Path, table: &MappingTable) -> ReconResult<(String, SourceRow)> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let mut workbook = SourceWorkbook::open(path)?;
    let fields = match workbook.first_worksheet()? {
        Some(grid) => DirectionalExtractor::extract(&grid, table)?,
        None => SourceRow::new(),
    };
    Ok((stem, fields))
}

/// 启动时扫描单据目录
///
/// 需同时具备 document_mapping 与 document_key，且目录中有文件；否则返回 None
pub async fn scan_documents(
    pool: &WorkerPool,
    layout: &RunLayout,
    config: &ReconConfig,
) -> ReconResult<Option<KeyedSupplement>> {
    let (Some(table), Some(key_field)) = (&config.document, &config.document_key) else {
        return Ok(None);
    };
    let files = list_supported_files(&layout.documents_dir)?;
    if files.is_empty() {
        return Ok(None);
    }

    let count = files.len();
    let entries = scan_files(pool, files, Arc::new(table.clone())).await?;
    info!(files = count, key_field = %key_field, "单据扫描完成");

    // 定向提取结果已是目标字段名
    let identity = MappingTable::identity(
        table
            .iter()
            .flat_map(|(_, rules)| rules.iter().map(|r| r.field_name.as_str())),
    );
    Ok(Some(KeyedSupplement {
        key_field: key_field.clone(),
        entries,
        mapping: Some(identity),
    }))
}
