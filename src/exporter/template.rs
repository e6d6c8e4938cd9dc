// ==========================================
// 多源表格对账合并引擎 - 输出模板
// ==========================================
// 职责: 启动时读取模板各工作表的表头行
// ==========================================

use crate::error::ResourceError;
use crate::importer::workbook::{header_row, SourceWorkbook};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct OutputTemplate {
    headers: HashMap<String, Vec<String>>,
}

impl OutputTemplate {
    /// 读取模板全部工作表的表头（模板缺失/损坏 → ResourceError）
    pub fn load(path: &Path) -> Result<Self, ResourceError> {
        let mut workbook = SourceWorkbook::open(path)?;
        let mut headers = HashMap::new();

        for name in workbook.sheet_names() {
            if let Some(grid) = workbook.worksheet(&name)? {
                let row = header_row(&grid);
                debug!(sheet = %name, columns = row.len(), "模板表头读取完成");
                headers.insert(name, row);
            }
        }

        Ok(Self { headers })
    }

    pub fn from_headers(headers: HashMap<String, Vec<String>>) -> Self {
        Self { headers }
    }

    /// 同名工作表的表头，不存在 → TemplateSheetMissing
    pub fn headers_for(&self, sheet: &str) -> Result<&[String], ResourceError> {
        self.headers
            .get(sheet)
            .map(Vec::as_slice)
            .ok_or_else(|| ResourceError::TemplateSheetMissing(sheet.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_for() {
        let mut map = HashMap::new();
        map.insert("CREATED".to_string(), vec!["po".to_string(), "eta".to_string()]);
        let template = OutputTemplate::from_headers(map);

        assert_eq!(template.headers_for("CREATED").unwrap().len(), 2);
        assert!(matches!(
            template.headers_for("NOT INCLUDED"),
            Err(ResourceError::TemplateSheetMissing(_))
        ));
    }

    #[test]
    fn test_missing_template_file() {
        assert!(matches!(
            OutputTemplate::load(Path::new("/nonexistent/template.xlsx")),
            Err(ResourceError::FileNotFound(_))
        ));
    }
}
