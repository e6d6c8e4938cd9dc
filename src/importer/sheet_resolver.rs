// ==========================================
// 多源表格对账合并引擎 - 工作表解析
// ==========================================
// 职责: 为工作表需求在源文件中确定实际读取的工作表
// 规则:
// - 存在同名工作表 → 直接使用
// - 否则按声明顺序取第一个表头包含全部关键字段的回退表
// - 均不满足 → None（记录告警）
// ==========================================

use crate::domain::source::SheetRequirement;
use crate::error::ResourceError;
use crate::importer::workbook::{header_row, SheetGrid, SourceWorkbook};
use tracing::{debug, warn};

/// 解析结果
#[derive(Debug, Clone)]
pub struct ResolvedSheet {
    pub name: String,
    pub grid: SheetGrid,
    pub is_fallback: bool,
}

pub struct SheetResolver;

impl SheetResolver {
    pub fn resolve(
        workbook: &mut SourceWorkbook,
        requirement: &SheetRequirement,
        file_name: &str,
    ) -> Result<Option<ResolvedSheet>, ResourceError> {
        if let Some(grid) = workbook.worksheet(&requirement.sheet_name)? {
            return Ok(Some(ResolvedSheet {
                name: requirement.sheet_name.clone(),
                grid,
                is_fallback: false,
            }));
        }

        let mut fallback = None;
        for name in &requirement.fallback_sheets {
            if let Some(resolved) = Self::try_fallback(workbook, requirement, name)? {
                fallback = Some(resolved);
                break;
            }
        }
        match &fallback {
            Some(resolved) => debug!(
                file = file_name,
                sheet = %requirement.sheet_name,
                fallback = %resolved.name,
                "使用回退工作表"
            ),
            None => warn!(
                file = file_name,
                sheet = %requirement.sheet_name,
                "无同名工作表且无有效回退表"
            ),
        }
        Ok(fallback)
    }

    /// 表头包含全部关键字段的回退表（按声明顺序）
    pub fn valid_fallbacks(
        workbook: &mut SourceWorkbook,
        requirement: &SheetRequirement,
    ) -> Result<Vec<ResolvedSheet>, ResourceError> {
        let mut valid = Vec::new();
        for name in &requirement.fallback_sheets {
            if let Some(resolved) = Self::try_fallback(workbook, requirement, name)? {
                valid.push(resolved);
            }
        }
        Ok(valid)
    }

    /// 单个回退表: 存在、非目标表本身、表头包含全部关键字段
    fn try_fallback(
        workbook: &mut SourceWorkbook,
        requirement: &SheetRequirement,
        name: &str,
    ) -> Result<Option<ResolvedSheet>, ResourceError> {
        if name == requirement.sheet_name {
            return Ok(None);
        }
        let Some(grid) = workbook.worksheet(name)? else {
            return Ok(None);
        };
        if !Self::header_has_keys(&header_row(&grid), &requirement.key_fields) {
            return Ok(None);
        }
        Ok(Some(ResolvedSheet {
            name: name.to_string(),
            grid,
            is_fallback: true,
        }))
    }

    /// 表头（已去空白）是否包含全部关键字段
    pub fn header_has_keys(header: &[String], key_fields: &[String]) -> bool {
        key_fields
            .iter()
            .all(|key| header.iter().any(|h| h == key.trim()))
    }
}
