//! 리랭커 - 쿼리/엔티티 일치 기반 점수 보정
//!
//! 퓨전 점수(combined_score)에 곱셈 부스트를 누적 적용합니다.
//!
//! | 조건 | 배수 |
//! |------|------|
//! | 콘텐츠에 원본 쿼리 포함 | ×1.5 |
//! | 엔티티 하나당 | ×1.2 |
//! | `Q:` 로 시작 (FAQ 형식) | ×1.3 |
//! | FAQ 소스 | ×1.4 |

use crate::source::Category;

use super::store::SearchResult;

pub const QUERY_MATCH_BOOST: f32 = 1.5;
pub const ENTITY_MATCH_BOOST: f32 = 1.2;
pub const QUESTION_PREFIX_BOOST: f32 = 1.3;
pub const FAQ_SOURCE_BOOST: f32 = 1.4;

const FAQ_SOURCE_LABEL: &str = "faq";
const QUESTION_PREFIX: &str = "Q:";

/// 결과 리랭크
///
/// 원본 필드는 그대로 두고 `rank_score` 를 채운 뒤 내림차순 정렬합니다.
pub fn rerank(results: Vec<SearchResult>, query: &str, entities: &[String]) -> Vec<SearchResult> {
    let query_lower = query.trim().to_lowercase();
    let entities_lower: Vec<String> = entities
        .iter()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    let mut ranked: Vec<SearchResult> = results
        .into_iter()
        .map(|mut result| {
            let factor = boost_factor(&result, &query_lower, &entities_lower);
            result.rank_score = Some(result.combined_score * factor);
            result
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

/// 결과 하나의 누적 부스트 배수
fn boost_factor(result: &SearchResult, query_lower: &str, entities_lower: &[String]) -> f32 {
    let content_lower = result.content.to_lowercase();
    let mut factor = 1.0;

    if !query_lower.is_empty() && content_lower.contains(query_lower) {
        factor *= QUERY_MATCH_BOOST;
    }

    for entity in entities_lower {
        if content_lower.contains(entity.as_str()) {
            factor *= ENTITY_MATCH_BOOST;
        }
    }

    if result.content.trim_start().starts_with(QUESTION_PREFIX) {
        factor *= QUESTION_PREFIX_BOOST;
    }

    if is_faq_source(result) {
        factor *= FAQ_SOURCE_BOOST;
    }

    factor
}

fn is_faq_source(result: &SearchResult) -> bool {
    result.metadata.source.eq_ignore_ascii_case(FAQ_SOURCE_LABEL)
        || result.metadata.category == Category::Faq
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::testing::result;

    fn scored(source_id: &str, content: &str, score: f32) -> SearchResult {
        let mut r = result(source_id, content);
        r.combined_score = score;
        r
    }

    #[test]
    fn test_literal_query_and_entity_boost() {
        let matching = scored(
            "casa_chunk_0",
            "Casa Bonita was restored with Trey Parker and Matt Stone.",
            0.5,
        );
        let plain = scored("other_chunk_0", "A retail interior in Denver.", 0.5);

        let ranked = rerank(vec![plain, matching], "Casa Bonita", &["Trey Parker".to_string()]);

        assert_eq!(ranked[0].source_id, "casa_chunk_0");
        let ratio = ranked[0].rank_score.unwrap() / ranked[1].rank_score.unwrap();
        assert!(ratio >= 1.5 * 1.2 - 1e-4);
    }

    #[test]
    fn test_entities_outrank_generic_match() {
        let generic = scored("generic_chunk_0", "We worked on a restaurant rebuild last year.", 0.5);
        let specific = scored(
            "casa_chunk_0",
            "Casa Bonita was reopened with Trey Parker after a long restoration.",
            0.5,
        );

        let entities = vec!["Casa Bonita".to_string(), "Trey Parker".to_string()];
        let ranked = rerank(vec![generic, specific], "restaurant project", &entities);

        assert_eq!(ranked[0].source_id, "casa_chunk_0");
        let top = ranked[0].rank_score.unwrap();
        let other = ranked[1].rank_score.unwrap();
        assert!(top / other >= 1.44 - 1e-4);
        assert!((top / 0.5 - 1.44).abs() < 1e-4);
    }

    #[test]
    fn test_boosts_compound() {
        let mut faq = scored("faq_chunk_0", "Q: Casa Bonita timeline?\nA: Two years.", 1.0);
        faq.metadata.source = "faq".to_string();

        let ranked = rerank(
            vec![faq],
            "casa bonita timeline",
            &["Casa Bonita".to_string()],
        );
        // 1.5 * 1.2 * 1.3 * 1.4
        let expected = 1.5 * 1.2 * 1.3 * 1.4;
        assert!((ranked[0].rank_score.unwrap() - expected).abs() < 1e-4);
    }

    #[test]
    fn test_keeps_original_fields() {
        let mut r = scored("a_chunk_0", "plain content", 0.4);
        r.similarity = Some(0.6);
        r.text_rank = Some(0.2);

        let ranked = rerank(vec![r.clone()], "unrelated", &[]);
        assert_eq!(ranked[0].combined_score, 0.4);
        assert_eq!(ranked[0].similarity, Some(0.6));
        assert_eq!(ranked[0].text_rank, Some(0.2));
        assert_eq!(ranked[0].rank_score, Some(0.4));
    }

    #[test]
    fn test_faq_category_counts_as_faq_source() {
        let mut r = scored("a_chunk_0", "answer text", 1.0);
        r.metadata.category = Category::Faq;
        let ranked = rerank(vec![r], "", &[]);
        assert!((ranked[0].rank_score.unwrap() - FAQ_SOURCE_BOOST).abs() < 1e-6);
    }

    #[test]
    fn test_empty_input() {
        assert!(rerank(Vec::new(), "anything", &[]).is_empty());
    }
}
