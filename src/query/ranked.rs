use std::collections::HashSet;

use serde::Serialize;

use crate::core::Part;
use crate::error::{Result, StoreError};
use crate::query::matcher::{normalize, ContainsMatcher, ExactMatcher, FieldMatcher};

/// 参与排名的字段（顺序即同 rank 内的发现顺序）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchField {
    PartNumber,
    Keywords,
    Description,
    SupplierPartNumber,
    BinNumber,
}

impl SearchField {
    pub const ALL: [SearchField; 5] = [
        SearchField::PartNumber,
        SearchField::Keywords,
        SearchField::Description,
        SearchField::SupplierPartNumber,
        SearchField::BinNumber,
    ];

    /// 精确匹配的 rank；部分匹配为其 10 倍
    pub fn exact_rank(self) -> u32 {
        match self {
            SearchField::PartNumber => 10,
            SearchField::Keywords => 20,
            SearchField::Description => 30,
            SearchField::SupplierPartNumber => 40,
            SearchField::BinNumber => 50,
        }
    }

    pub fn partial_rank(self) -> u32 {
        self.exact_rank() * 10
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchResult {
    /// 越小越好
    pub rank: u32,
    pub part: Part,
}

/// 按空白切分，丢弃空 token，统一 normalize
pub fn tokenize(keywords: &str) -> Vec<String> {
    keywords.split_whitespace().map(normalize).collect()
}

/// 单个零件的已归一字段值（每次查询算一次）
struct NormalizedPart {
    part_number: Vec<String>,
    keywords: Vec<String>,
    description: Vec<String>,
    supplier_part_numbers: Vec<String>,
    bin_numbers: Vec<String>,
}

impl NormalizedPart {
    fn new(p: &Part) -> Self {
        let non_empty = |s: &str| -> Vec<String> {
            if s.is_empty() {
                Vec::new()
            } else {
                vec![normalize(s)]
            }
        };
        Self {
            part_number: non_empty(&p.part_number),
            keywords: p
                .keywords
                .iter()
                .filter(|k| !k.is_empty())
                .map(|k| normalize(k))
                .collect(),
            description: non_empty(&p.description),
            supplier_part_numbers: p.supplier_part_numbers().map(normalize).collect(),
            bin_numbers: p.bin_numbers().map(normalize).collect(),
        }
    }

    fn values(&self, field: SearchField) -> &[String] {
        match field {
            SearchField::PartNumber => &self.part_number,
            SearchField::Keywords => &self.keywords,
            SearchField::Description => &self.description,
            SearchField::SupplierPartNumber => &self.supplier_part_numbers,
            SearchField::BinNumber => &self.bin_numbers,
        }
    }
}

/// 两轮排名搜索
///
/// 1) 精确轮：token 等于字段值（列表字段等于任一元素），rank 10/20/30/40/50
/// 2) 部分轮：token 是字段值子串，rank 100/200/300/400/500
///
/// 两轮结果拼接后按 rank 稳定排序，再按 part_id 去重保留首个（最优）命中。
/// 同 rank 的先后即发现顺序：轮次 → 字段 → 零件在快照中的顺序。
pub fn find_parts(parts: &[Part], keywords: &str) -> Result<Vec<SearchResult>> {
    let tokens = tokenize(keywords);
    if tokens.is_empty() {
        return Err(StoreError::InvalidQuery(
            "keywords must contain at least one non-whitespace token".into(),
        ));
    }

    let normalized: Vec<NormalizedPart> = parts.iter().map(NormalizedPart::new).collect();

    let passes: [(&dyn FieldMatcher, fn(SearchField) -> u32); 2] = [
        (&ExactMatcher, SearchField::exact_rank),
        (&ContainsMatcher, SearchField::partial_rank),
    ];

    let mut hits: Vec<(u32, usize)> = Vec::new();
    for (matcher, rank_of) in passes {
        for field in SearchField::ALL {
            let rank = rank_of(field);
            for (idx, np) in normalized.iter().enumerate() {
                let hit = np.values(field).iter().any(|value| {
                    tokens
                        .iter()
                        .any(|token| matcher.matches(value.as_str(), token.as_str()))
                });
                if hit {
                    hits.push((rank, idx));
                }
            }
        }
    }

    // sort_by_key 是稳定排序
    hits.sort_by_key(|(rank, _)| *rank);

    let mut seen: HashSet<u64> = HashSet::new();
    let mut results = Vec::new();
    for (rank, idx) in hits {
        let part = &parts[idx];
        if seen.insert(part.part_id) {
            results.push(SearchResult {
                rank,
                part: part.clone(),
            });
        }
    }

    tracing::debug!(
        "find_parts: tokens={} candidates={} results={}",
        tokens.len(),
        parts.len(),
        results.len()
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(id: u64, number: &str, desc: &str) -> Part {
        let mut p = Part::new(number).with_description(desc);
        p.part_id = id;
        p
    }

    #[test]
    fn exact_part_number_beats_partial() {
        let parts = vec![part(1, "LM358", "Op Amp"), part(2, "LM358N", "dual op amp")];
        let r = find_parts(&parts, "LM358").unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r[0].part.part_number, "LM358");
        assert_eq!(r[0].rank, 10);
        assert_eq!(r[1].part.part_number, "LM358N");
        assert_eq!(r[1].rank, 100);
    }

    #[test]
    fn insertion_order_does_not_change_ranking() {
        let parts = vec![part(1, "LM358N", "dual op amp"), part(2, "LM358", "Op Amp")];
        let r = find_parts(&parts, "lm358").unwrap();
        assert_eq!(r[0].part.part_id, 2);
        assert_eq!(r[1].part.part_id, 1);
    }

    #[test]
    fn each_field_has_its_own_rank() {
        let mut kw = part(1, "A", "");
        kw.keywords = vec!["opamp".into()];
        let desc = part(2, "B", "opamp");
        let mut sup = part(3, "C", "");
        sup.digikey_part_number = "opamp".into();
        let mut bin = part(4, "D", "");
        bin.bin_number2 = "opamp".into();

        let parts = vec![bin, sup, desc, kw];
        let r = find_parts(&parts, "OPAMP").unwrap();
        let ranks: Vec<(u64, u32)> = r.iter().map(|h| (h.part.part_id, h.rank)).collect();
        assert_eq!(ranks, vec![(1, 20), (2, 30), (3, 40), (4, 50)]);
    }

    #[test]
    fn partial_pass_ranks_by_field() {
        let mut kw = part(1, "X1", "");
        kw.keywords = vec!["resistor-pack".into()];
        let desc = part(2, "X2", "thick film resistor");
        let r = find_parts(&[desc, kw], "resist").unwrap();
        let ranks: Vec<(u64, u32)> = r.iter().map(|h| (h.part.part_id, h.rank)).collect();
        assert_eq!(ranks, vec![(1, 200), (2, 300)]);
    }

    #[test]
    fn part_matching_many_fields_appears_once_at_best_rank() {
        let mut p = part(7, "NE555", "NE555 timer");
        p.keywords = vec!["ne555".into(), "timer".into()];
        p.bin_number = "NE555-bin".into();
        let r = find_parts(&[p], "timer ne555").unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].rank, 10);
    }

    #[test]
    fn multiple_tokens_any_match() {
        let parts = vec![part(1, "LM358", ""), part(2, "NE555", ""), part(3, "7805", "")];
        let r = find_parts(&parts, "  ne555   lm358 ").unwrap();
        let ids: Vec<u64> = r.iter().map(|h| h.part.part_id).collect();
        // 同 rank：按零件在快照中的顺序
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn empty_query_is_rejected() {
        let parts = vec![part(1, "LM358", "")];
        assert!(matches!(find_parts(&parts, ""), Err(StoreError::InvalidQuery(_))));
        assert!(matches!(
            find_parts(&parts, " \t\n "),
            Err(StoreError::InvalidQuery(_))
        ));
    }

    #[test]
    fn no_match_returns_empty() {
        let parts = vec![part(1, "LM358", "Op Amp")];
        assert!(find_parts(&parts, "zzz").unwrap().is_empty());
    }
}
