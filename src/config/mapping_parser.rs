// ==========================================
// 多源表格对账合并引擎 - 映射规则解析器
// ==========================================
// 职责: 解析行式映射 DSL → Rule / MappingTable / FixedMapping
// 格式: source_key<splitter>field_name<prefix>k1<kv>v1<cond>k2<kv>v2
// 默认: ':'  '|'  ','  '='
// ==========================================
// 例:
//   PO NO.:po|splitter=-,mode=last
//   WEIGHT:weight|method=round,dp=1
//   PO NO.:po_raw|considerEmpty=true
// ==========================================

use crate::domain::rule::{Direction, FixedMapping, MappingTable, Method, ReadingMode, Rule, SplitMode};
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

// ==========================================
// DslSyntax - 分隔符配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DslSyntax {
    pub splitter: String,
    pub prefix_separator: String,
    pub condition_separator: String,
    pub key_value_separator: String,
}

impl Default for DslSyntax {
    fn default() -> Self {
        Self {
            splitter: ":".to_string(),
            prefix_separator: "|".to_string(),
            condition_separator: ",".to_string(),
            key_value_separator: "=".to_string(),
        }
    }
}

// ==========================================
// 规则参数赋值表（启动时构建一次）
// ==========================================
type RuleSetter = fn(&mut Rule, &str) -> Result<(), String>;

fn rule_setters() -> &'static HashMap<&'static str, RuleSetter> {
    static SETTERS: OnceLock<HashMap<&'static str, RuleSetter>> = OnceLock::new();
    SETTERS.get_or_init(|| {
        let mut setters: HashMap<&'static str, RuleSetter> = HashMap::new();
        setters.insert("splitter", set_splitter);
        setters.insert("mode", set_mode);
        setters.insert("index", set_index);
        setters.insert("method", set_method);
        setters.insert("dp", set_dp);
        setters.insert("dir", set_dir);
        setters.insert("count", set_count);
        setters.insert("readingMode", set_reading_mode);
        setters.insert("considerEmpty", set_consider_empty);
        setters
    })
}

// splitter 不做 trim：空格本身可能就是分隔符
fn set_splitter(rule: &mut Rule, value: &str) -> Result<(), String> {
    rule.splitter = Some(value.to_string());
    Ok(())
}

fn set_mode(rule: &mut Rule, value: &str) -> Result<(), String> {
    rule.mode = match value.trim() {
        "last" => Some(SplitMode::Last),
        "allbutlast" => Some(SplitMode::AllButLast),
        "" | "none" => None,
        other => return Err(format!("未知的 mode: {}", other)),
    };
    Ok(())
}

fn set_index(rule: &mut Rule, value: &str) -> Result<(), String> {
    let index = value
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("index 需为整数: {}", e))?;
    rule.index = Some(index);
    Ok(())
}

fn set_method(rule: &mut Rule, value: &str) -> Result<(), String> {
    rule.method = match value.trim() {
        "round" => Some(Method::Round),
        "" | "none" => None,
        other => return Err(format!("未知的 method: {}", other)),
    };
    Ok(())
}

fn set_dp(rule: &mut Rule, value: &str) -> Result<(), String> {
    rule.dp = value
        .trim()
        .parse::<i32>()
        .map_err(|e| format!("dp 需为整数: {}", e))?;
    Ok(())
}

fn set_dir(rule: &mut Rule, value: &str) -> Result<(), String> {
    rule.dir = match value.trim() {
        "row" => Direction::Row,
        "column" => Direction::Column,
        other => return Err(format!("未知的 dir: {}", other)),
    };
    Ok(())
}

fn set_count(rule: &mut Rule, value: &str) -> Result<(), String> {
    let count = value
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("count 需为非负整数: {}", e))?;
    rule.count = Some(count);
    Ok(())
}

fn set_reading_mode(rule: &mut Rule, value: &str) -> Result<(), String> {
    rule.reading_mode = match value.trim() {
        "readUntilBlank" => Some(ReadingMode::ReadUntilBlank),
        "" | "none" => None,
        other => return Err(format!("未知的 readingMode: {}", other)),
    };
    Ok(())
}

fn set_consider_empty(rule: &mut Rule, value: &str) -> Result<(), String> {
    rule.consider_empty = match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        other => return Err(format!("considerEmpty 需为布尔值: {}", other)),
    };
    Ok(())
}

// ==========================================
// MappingParser - DSL 解析器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct MappingParser {
    syntax: DslSyntax,
}

impl MappingParser {
    pub fn new(syntax: DslSyntax) -> Self {
        Self { syntax }
    }

    pub fn syntax(&self) -> &DslSyntax {
        &self.syntax
    }

    /// 解析目标规格（splitter 右侧部分）为 Rule
    ///
    /// field_name 恒为前缀分隔符之前的部分；未知参数名忽略
    pub fn parse_rule(&self, target: &str) -> Result<Rule, ConfigError> {
        let syntax = &self.syntax;
        let (field_part, params) = match target.split_once(syntax.prefix_separator.as_str()) {
            Some((field, params)) => (field, Some(params)),
            None => (target, None),
        };

        let mut rule = Rule::new(field_part.trim());

        if let Some(params) = params {
            let setters = rule_setters();
            for param in params.split(syntax.condition_separator.as_str()) {
                let Some((key, value)) = param.split_once(syntax.key_value_separator.as_str())
                else {
                    continue;
                };
                let key = key.trim();
                match setters.get(key) {
                    Some(setter) => {
                        setter(&mut rule, value).map_err(|message| {
                            ConfigError::InvalidParameter {
                                key: key.to_string(),
                                value: value.to_string(),
                                message,
                            }
                        })?;
                    }
                    None => debug!(param = key, "忽略未知规则参数"),
                }
            }
        }

        Ok(rule)
    }

    /// 逐行解析为 (行号, 源键, 规则)
    fn parse_lines(&self, source_name: &str, text: &str) -> Result<Vec<(usize, String, Rule)>, ConfigError> {
        let mut parsed = Vec::new();

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let malformed = |message: String| ConfigError::MalformedLine {
                file: source_name.to_string(),
                line: line_no,
                message,
            };

            let (key, target) = line
                .split_once(self.syntax.splitter.as_str())
                .ok_or_else(|| malformed(format!("缺少分隔符 {:?}", self.syntax.splitter)))?;

            let key = key.trim();
            if key.is_empty() {
                return Err(malformed("源键为空".to_string()));
            }

            let rule = self.parse_rule(target).map_err(|e| malformed(e.to_string()))?;
            if rule.field_name.is_empty() {
                return Err(malformed("目标字段名为空".to_string()));
            }

            parsed.push((line_no, key.to_string(), rule));
        }

        Ok(parsed)
    }

    /// 解析为映射表（同一源键多行累加，即扇出）
    pub fn parse_table(&self, source_name: &str, text: &str) -> Result<MappingTable, ConfigError> {
        let mut table = MappingTable::new();
        for (_, key, rule) in self.parse_lines(source_name, text)? {
            table.push(key, rule);
        }
        debug!(source = source_name, entries = table.len(), "映射表解析完成");
        Ok(table)
    }

    /// 解析为固定值映射（目标列 → field_name 字面量，后者覆盖前者）
    pub fn parse_fixed(&self, source_name: &str, text: &str) -> Result<FixedMapping, ConfigError> {
        let mut fixed = FixedMapping::new();
        for (_, key, rule) in self.parse_lines(source_name, text)? {
            fixed.insert(key, rule.field_name);
        }
        Ok(fixed)
    }

    /// 从文件加载映射表
    pub fn load_table(&self, path: &Path) -> Result<MappingTable, ConfigError> {
        let text = read_config_file(path)?;
        self.parse_table(&display_name(path), &text)
    }

    /// 从文件加载映射表，文件不存在时返回 None
    pub fn load_table_optional(&self, path: &Path) -> Result<Option<MappingTable>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        self.load_table(path).map(Some)
    }

    /// 从文件加载固定值映射
    pub fn load_fixed(&self, path: &Path) -> Result<FixedMapping, ConfigError> {
        let text = read_config_file(path)?;
        self.parse_fixed(&display_name(path), &text)
    }
}

fn read_config_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("config")
        .to_string()
}
