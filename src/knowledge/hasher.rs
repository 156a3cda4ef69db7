//! Content Hasher - 변경 감지용 콘텐츠 지문
//!
//! SHA-256 다이제스트를 소문자 hex 문자열로 반환합니다.
//! 메타데이터는 객체 키를 재귀적으로 정렬한 뒤 직렬화하므로
//! 키 순서가 달라도 같은 해시가 나옵니다.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// 텍스트 해시 (SHA-256 hex)
pub fn hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("{:x}", digest)
}

/// 콘텐츠 + 메타데이터 해시
///
/// 메타데이터 객체의 키를 재귀적으로 정렬하여 직렬화합니다.
/// 배열은 순서를 그대로 유지합니다.
pub fn hash_document(content: &str, metadata: &Value) -> String {
    let canonical = canonicalize(metadata);

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    // 콘텐츠와 메타데이터 경계 구분자
    hasher.update([0u8]);
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 두 해시 비교
#[inline]
pub fn hashes_match(a: &str, b: &str) -> bool {
    a == b
}

/// 객체 키를 재귀적으로 정렬한 사본 생성
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
