//! 타입 카탈로그 -- collectd `types.db` 파일 로더
//!
//! 각 줄은 `name  field:KIND:min:max[, field:KIND:min:max ...]` 형식이며,
//! `#`으로 시작하는 줄과 빈 줄은 무시합니다. `min`/`max`의 `U`는 경계 없음을 뜻합니다.
//!
//! 여러 파일을 순서대로 읽으며, 같은 타입 이름은 나중 파일의 정의가 이깁니다.
//! 로드가 끝나면 카탈로그는 불변입니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::CollectdError;
use crate::types::ValueKind;

/// 경로가 지정되지 않았을 때 탐색하는 기본 types.db 위치
pub const DEFAULT_TYPES_DB_PATHS: &[&str] = &[
    "/opt/collectd/share/collectd/types.db",
    "/usr/local/share/collectd/types.db",
    "/usr/share/collectd/types.db",
];

/// 경계 없음을 뜻하는 min/max 표기
const UNBOUND: &str = "U";

/// 타입의 필드 하나
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// 필드 이름 (값 이름)
    pub name: String,
    /// 데이터 소스 종류
    pub kind: ValueKind,
    /// 하한 (`None`이면 경계 없음)
    pub min: Option<f64>,
    /// 상한 (`None`이면 경계 없음)
    pub max: Option<f64>,
}

impl FieldSpec {
    /// 값이 [min, max] 범위 안에 있는지 확인합니다.
    pub fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

/// 타입 이름 → 순서 있는 필드 목록
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    types: HashMap<String, Vec<FieldSpec>>,
}

impl TypeCatalog {
    /// 빈 카탈로그를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// types.db 파일들을 로드합니다.
    ///
    /// `paths`가 비어 있으면 [`DEFAULT_TYPES_DB_PATHS`] 중 존재하는 첫 파일을 사용합니다.
    /// 읽을 수 있는 파일이 하나도 없거나 정의가 하나도 없으면 `Config` 에러입니다.
    pub fn load(paths: &[PathBuf]) -> Result<Self, CollectdError> {
        let candidates: Vec<PathBuf> = if paths.is_empty() {
            DEFAULT_TYPES_DB_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|p| p.is_file())
                .into_iter()
                .collect()
        } else {
            paths.to_vec()
        };

        if candidates.is_empty() {
            return Err(CollectdError::config(
                "types_db",
                "Unable to locate types.db",
            ));
        }

        let mut catalog = Self::new();
        for path in &candidates {
            catalog.load_file(path)?;
        }

        if catalog.is_empty() {
            return Err(CollectdError::config(
                "types_db",
                "no type definitions found",
            ));
        }

        info!(
            files = candidates.len(),
            types = catalog.len(),
            "loaded types.db"
        );
        Ok(catalog)
    }

    /// 파일 하나를 읽어 기존 정의 위에 덮어씁니다.
    fn load_file(&mut self, path: &Path) -> Result<(), CollectdError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CollectdError::config("types_db", format!("{}: {e}", path.display()))
        })?;
        let added = self.load_str(&content);
        debug!(path = %path.display(), types = added, "parsed types.db file");
        Ok(())
    }

    /// 문자열로 된 types.db 내용을 읽어 정의를 추가합니다.
    ///
    /// 해석할 수 없는 줄은 경고 후 건너뜁니다. 추가된 정의 수를 반환합니다.
    pub fn load_str(&mut self, content: &str) -> usize {
        let mut added = 0;
        for (lineno, line) in content.lines().enumerate() {
            match parse_line(line) {
                Ok(Some((name, fields))) => {
                    self.types.insert(name, fields);
                    added += 1;
                }
                Ok(None) => {}
                Err(reason) => {
                    warn!(line = lineno + 1, reason = %reason, "skipping invalid types.db line");
                }
            }
        }
        added
    }

    /// 타입의 필드 목록을 반환합니다.
    pub fn get(&self, type_name: &str) -> Result<&[FieldSpec], CollectdError> {
        self.types
            .get(type_name)
            .map(Vec::as_slice)
            .ok_or_else(|| CollectdError::protocol(format!("Unknown type: {type_name}")))
    }

    /// `(type, field)`의 범위 정보를 반환합니다.
    pub fn range(&self, type_name: &str, field: &str) -> Option<(Option<f64>, Option<f64>)> {
        self.field(type_name, field).map(|f| (f.min, f.max))
    }

    /// `(type, field)`의 필드 정의를 반환합니다.
    pub fn field(&self, type_name: &str, field: &str) -> Option<&FieldSpec> {
        self.types
            .get(type_name)
            .and_then(|fields| fields.iter().find(|f| f.name == field))
    }

    /// 등록된 타입 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// 등록된 타입이 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// types.db 한 줄을 해석합니다.
///
/// 주석/빈 줄이면 `Ok(None)`을 반환합니다.
pub fn parse_line(line: &str) -> Result<Option<(String, Vec<FieldSpec>)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (name, rest) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| format!("type '{line}' has no fields"))?;

    let fields = rest
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_field)
        .collect::<Result<Vec<_>, _>>()?;

    if fields.is_empty() {
        return Err(format!("type '{name}' has no fields"));
    }

    Ok(Some((name.to_owned(), fields)))
}

fn parse_field(spec: &str) -> Result<FieldSpec, String> {
    let parts: Vec<&str> = spec.split(':').collect();
    let [name, kind, min, max] = parts.as_slice() else {
        return Err(format!("field '{spec}' must be name:KIND:min:max"));
    };

    let kind = ValueKind::from_name(kind).ok_or_else(|| format!("unknown kind '{kind}'"))?;

    Ok(FieldSpec {
        name: (*name).to_owned(),
        kind,
        min: parse_bound(min)?,
        max: parse_bound(max)?,
    })
}

fn parse_bound(raw: &str) -> Result<Option<f64>, String> {
    if raw == UNBOUND {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| format!("invalid bound '{raw}'"))
}
