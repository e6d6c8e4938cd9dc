// ==========================================
// 多源表格对账合并引擎 - 源文件清单
// ==========================================
// 职责: 扫描输入目录 + 启动时逐个校验文件可打开
// 红线: 任何文件缺失/损坏/不支持 → 启动失败（不生成输出）
// ==========================================

use crate::config::layout::RunLayout;
use crate::domain::source::{SourceCategory, SourceFile};
use crate::error::ResourceError;
use crate::importer::workbook::{is_supported_file, SourceWorkbook};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct SourceInventory {
    files: Vec<SourceFile>,
}

impl SourceInventory {
    /// 扫描布局中的全部输入目录
    ///
    /// 基准目录下无文件 → NoBaseline
    pub fn scan(layout: &RunLayout) -> Result<Self, ResourceError> {
        let mut files = Vec::new();

        for (dir, category) in layout.input_dirs() {
            let paths = list_supported_files(dir)?;
            if category == SourceCategory::Baseline && paths.is_empty() {
                return Err(ResourceError::NoBaseline(dir.to_path_buf()));
            }
            for path in paths {
                files.push(validate_file(path, category)?);
            }
        }

        let inventory = Self { files };
        info!(
            baseline = inventory.by_category(SourceCategory::Baseline).len(),
            response = inventory.by_category(SourceCategory::Response).len(),
            report = inventory.by_category(SourceCategory::Report).len(),
            other = inventory.by_category(SourceCategory::Other).len(),
            "源文件校验完成"
        );
        Ok(inventory)
    }

    pub fn from_files(files: Vec<SourceFile>) -> Self {
        Self { files }
    }

    /// 指定类别的文件（按路径排序）
    pub fn by_category(&self, category: SourceCategory) -> Vec<&SourceFile> {
        let mut selected: Vec<&SourceFile> =
            self.files.iter().filter(|f| f.category == category).collect();
        selected.sort_by(|a, b| a.path.cmp(&b.path));
        selected
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// 列出目录下受支持的文件（不递归，按文件名排序）
///
/// 目录不存在视为空
pub fn list_supported_files(dir: &Path) -> Result<Vec<PathBuf>, ResourceError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let io_err = |source| ResourceError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && is_supported_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// 打开文件读取工作表名
fn validate_file(path: PathBuf, category: SourceCategory) -> Result<SourceFile, ResourceError> {
    let workbook = SourceWorkbook::open(&path)?;
    let sheet_names = workbook.sheet_names();
    debug!(file = %path.display(), %category, sheets = ?sheet_names, "文件校验通过");
    Ok(SourceFile::new(path, category, sheet_names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scan_categorises_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::new(dir.path());
        layout.ensure_directories().unwrap();

        fs::write(layout.baseline_dir.join("b.csv"), "po\nP1\n").unwrap();
        fs::write(layout.baseline_dir.join("a.csv"), "po\nP0\n").unwrap();
        fs::write(layout.baseline_dir.join("~$a.csv"), "lock").unwrap();
        fs::write(layout.response_dir.join("r.csv"), "po\nP1\n").unwrap();
        fs::write(layout.response_dir.join("notes.txt"), "ignored").unwrap();

        let inventory = SourceInventory::scan(&layout).unwrap();
        assert_eq!(inventory.len(), 3);

        let baseline = inventory.by_category(SourceCategory::Baseline);
        assert_eq!(baseline[0].display_name(), "a.csv");
        assert_eq!(baseline[1].display_name(), "b.csv");
        assert!(baseline[0].has_sheet("Sheet1"));
        assert!(inventory.by_category(SourceCategory::Report).is_empty());
    }

    #[test]
    fn test_missing_baseline_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::new(dir.path());
        layout.ensure_directories().unwrap();

        assert!(matches!(
            SourceInventory::scan(&layout),
            Err(ResourceError::NoBaseline(_))
        ));
    }

    #[test]
    fn test_corrupt_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::new(dir.path());
        layout.ensure_directories().unwrap();
        fs::write(layout.baseline_dir.join("a.csv"), "po\nP0\n").unwrap();
        fs::write(layout.report_dir.join("broken.xlsx"), "not a workbook").unwrap();

        assert!(matches!(
            SourceInventory::scan(&layout),
            Err(ResourceError::Corrupt { .. })
        ));
    }
}
