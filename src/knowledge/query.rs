//! 쿼리 분석 - 키워드/엔티티 추출
//!
//! - keywords: 키워드 검색 보강용 (소문자, 3자 이상, 불용어 제외)
//! - entities: 리랭커 부스트용 (대문자로 시작하는 2단어 이상 구문, 따옴표 구문)

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// 영어 불용어
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "your", "all", "any", "can", "had", "her",
    "was", "one", "our", "out", "has", "have", "his", "how", "its", "who", "did", "does", "get",
    "got", "him", "she", "they", "them", "their", "this", "that", "these", "those", "with",
    "from", "what", "when", "where", "which", "why", "will", "would", "could", "should", "about",
    "into", "than", "then", "there", "here", "been", "being", "were", "also", "some", "more",
    "most", "much", "many", "very", "just", "over", "such", "only", "own", "same", "tell",
    "please", "done", "work", "worked",
];

/// 대문자로 시작하는 단어가 2개 이상 이어진 구문
static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| compile_regex(r"\b[A-Z][\w'&-]*(?:\s+[A-Z][\w'&-]*)+"));

/// 곧은/굽은 따옴표 구문
static QUOTED_RE: Lazy<Regex> = Lazy::new(|| compile_regex(r#""([^"]+)"|“([^”]+)”"#));

/// 정적 패턴 전용 (잘못된 리터럴은 즉시 실패)
fn compile_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid regex literal {pattern}: {err}"))
}

/// 쿼리 분석 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryAnalysis {
    pub keywords: Vec<String>,
    pub entities: Vec<String>,
}

/// 쿼리 분석
pub fn analyze(query: &str) -> QueryAnalysis {
    QueryAnalysis {
        keywords: extract_keywords(query),
        entities: extract_entities(query),
    }
}

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// 키워드 추출 (입력 순서 유지, 중복 제거)
pub fn extract_keywords(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();

    query
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 3 && !is_stopword(w))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// 엔티티 추출
///
/// 문장 첫 단어처럼 불용어로 시작하는 구문은 앞쪽 불용어를 떼어냅니다.
pub fn extract_entities(query: &str) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    let mut seen = HashSet::new();

    let mut push = |entity: String, entities: &mut Vec<String>| {
        if seen.insert(entity.to_lowercase()) {
            entities.push(entity);
        }
    };

    for caps in QUOTED_RE.captures_iter(query) {
        let phrase = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().trim())
            .unwrap_or("");
        if !phrase.is_empty() {
            push(phrase.to_string(), &mut entities);
        }
    }

    for m in ENTITY_RE.find_iter(query) {
        let words: Vec<&str> = m
            .as_str()
            .split_whitespace()
            .skip_while(|w| is_stopword(&w.to_lowercase()))
            .collect();

        if words.len() >= 2 {
            push(words.join(" "), &mut entities);
        }
    }

    entities
}
