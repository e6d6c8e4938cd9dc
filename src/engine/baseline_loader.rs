// ==========================================
// 多源表格对账合并引擎 - 基准数据加载
// ==========================================
// 职责: 从基准文件构建 复合主键 → 目标行 的基准表
// 规则:
// - 基准文件按文件名顺序加载，每个文件独立解析工作表
// - 所有基准文件均无法解析工作表 → SheetUnresolvable
// - 重复主键: 告警，后者覆盖内容，保留首次出现的位置
// - 目标行 = 模板表头（空值）+ 固定值 + 基准映射结果
// ==========================================
// 并发: 合并阶段主键索引不可变，每行独立加锁
// ==========================================

use crate::config::ReconConfig;
use crate::domain::source::{file_name_of, CompositeKey, DestRow, SheetRequirement};
use crate::error::{MergeError, ReconResult};
use crate::importer::column_extractor::ColumnExtractor;
use crate::importer::row_reader::{RequiredMode, RowReader};
use crate::importer::sheet_resolver::SheetResolver;
use crate::importer::workbook::SourceWorkbook;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

// ==========================================
// BaselineTable - 基准表
// ==========================================
#[derive(Debug, Default)]
pub struct BaselineTable {
    order: Vec<CompositeKey>,
    rows: HashMap<CompositeKey, Mutex<DestRow>>,
}

impl BaselineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入基准行，主键已存在时返回 true（覆盖内容，保留位置）
    pub fn insert(&mut self, key: CompositeKey, row: DestRow) -> bool {
        match self.rows.get_mut(&key) {
            Some(existing) => {
                *existing.get_mut().unwrap_or_else(|p| p.into_inner()) = row;
                true
            }
            None => {
                self.order.push(key.clone());
                self.rows.insert(key, Mutex::new(row));
                false
            }
        }
    }

    pub fn contains(&self, key: &CompositeKey) -> bool {
        self.rows.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 主键（插入顺序）
    pub fn keys(&self) -> &[CompositeKey] {
        &self.order
    }

    /// 复合主键第 position 段等于 value 的全部主键
    pub fn keys_with_part(&self, position: usize, value: &str) -> Vec<&CompositeKey> {
        self.order
            .iter()
            .filter(|key| key.part(position) == Some(value))
            .collect()
    }

    fn lock<'a>(&'a self, key: &CompositeKey) -> Result<Option<MutexGuard<'a, DestRow>>, MergeError> {
        match self.rows.get(key) {
            Some(row) => row
                .lock()
                .map(Some)
                .map_err(|_| MergeError::LockPoisoned(key.to_string())),
            None => Ok(None),
        }
    }

    /// 在该行锁内写入字段（后写者胜）
    ///
    /// 主键不存在返回 false
    pub fn merge_into(&self, key: &CompositeKey, fields: DestRow) -> Result<bool, MergeError> {
        match self.lock(key)? {
            Some(mut row) => {
                row.extend(fields);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 读取单行副本
    pub fn row(&self, key: &CompositeKey) -> Result<Option<DestRow>, MergeError> {
        Ok(self.lock(key)?.map(|row| row.clone()))
    }

    /// 按插入顺序导出全部行
    pub fn snapshot(&self) -> Result<Vec<(CompositeKey, DestRow)>, MergeError> {
        let mut rows = Vec::with_capacity(self.order.len());
        for key in &self.order {
            if let Some(row) = self.row(key)? {
                rows.push((key.clone(), row));
            }
        }
        Ok(rows)
    }
}

// ==========================================
// BaselineLoader - 基准加载器
// ==========================================
pub struct BaselineLoader<'a> {
    requirement: &'a SheetRequirement,
    headers: &'a [String],
    config: &'a ReconConfig,
}

/// 加载统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaselineStats {
    pub files_resolved: usize,
    pub rows_read: usize,
    pub duplicates: usize,
}

impl<'a> BaselineLoader<'a> {
    pub fn new(requirement: &'a SheetRequirement, headers: &'a [String], config: &'a ReconConfig) -> Self {
        Self {
            requirement,
            headers,
            config,
        }
    }

    /// 加载全部基准文件（调用方保证已排序）
    pub fn load(&self, files: &[PathBuf]) -> ReconResult<(BaselineTable, BaselineStats)> {
        let sheet = &self.requirement.sheet_name;
        let mut table = BaselineTable::new();
        let mut stats = BaselineStats::default();

        for path in files {
            let file_name = file_name_of(path);
            let mut workbook = SourceWorkbook::open(path)?;
            let Some(resolved) = SheetResolver::resolve(&mut workbook, self.requirement, &file_name)? else {
                continue;
            };
            stats.files_resolved += 1;

            let reader = RowReader::new(
                &resolved.grid,
                &self.requirement.key_fields,
                RequiredMode::Lenient,
                self.config.settings.empty_row_limit,
            );

            for source_row in reader {
                stats.rows_read += 1;
                let key = self.requirement.key_of(&source_row)?;

                let mut dest = ColumnExtractor::seed_row(self.headers.iter().map(String::as_str));
                ColumnExtractor::stamp_fixed(&mut dest, &self.config.fixed);
                dest.extend(ColumnExtractor::extract(&source_row, &self.config.baseline)?);

                if table.insert(key.clone(), dest) {
                    stats.duplicates += 1;
                    warn!(sheet = %sheet, file = %file_name, key = %key, "发现重复基准数据，后者覆盖");
                }
            }
            debug!(sheet = %sheet, file = %file_name, worksheet = %resolved.name, "基准文件加载完成");
        }

        if stats.files_resolved == 0 {
            return Err(MergeError::SheetUnresolvable { sheet: sheet.clone() }.into());
        }

        info!(
            sheet = %sheet,
            rows = table.len(),
            duplicates = stats.duplicates,
            "基准数据加载完成"
        );
        Ok((table, stats))
    }
}
