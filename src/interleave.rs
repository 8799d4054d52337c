use rand::Rng;

use crate::models::QuestionItem;

/// Merges per-batch question sets into one result of at most `count` items.
///
/// Repeatedly picks a still-non-empty set uniformly at random and removes a
/// uniformly-random question from it. Uniqueness holds by construction: a
/// picked question leaves its set, so nothing is ever drawn twice. When the
/// sets hold fewer than `count` questions in total, the merge exhausts them
/// and returns what exists instead of inventing items.
pub fn interleave_questions<R: Rng + ?Sized>(
    mut sets: Vec<Vec<QuestionItem>>,
    count: usize,
    rng: &mut R,
) -> Vec<QuestionItem> {
    sets.retain(|set| !set.is_empty());

    let mut result = Vec::with_capacity(count);
    while result.len() < count && !sets.is_empty() {
        let set_index = rng.gen_range(0..sets.len());
        let item_index = rng.gen_range(0..sets[set_index].len());

        result.push(sets[set_index].swap_remove(item_index));

        if sets[set_index].is_empty() {
            sets.swap_remove(set_index);
        }
    }

    result
}

/// Exact field-presence and count check on the assembled quiz.
pub fn validate_quiz(questions: &[QuestionItem], expected: usize) -> bool {
    questions.len() == expected && questions.iter().all(QuestionItem::is_complete)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn item(number: usize) -> QuestionItem {
        QuestionItem {
            question: Some(format!("Question {number}?")),
            correct_answer: Some(vec!["A".to_string()]),
            options: Some(
                [("A", "yes"), ("B", "no")]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            explanation: Some("Because.".to_string()),
            answer_location: Some("Somewhere.".to_string()),
            href: Some("ch01.xhtml".to_string()),
            question_number: Some(serde_json::json!(number)),
        }
    }

    fn set(numbers: std::ops::Range<usize>) -> Vec<QuestionItem> {
        numbers.map(item).collect()
    }

    fn numbers(items: &[QuestionItem]) -> HashSet<u64> {
        items
            .iter()
            .map(|q| q.question_number.as_ref().unwrap().as_u64().unwrap())
            .collect()
    }

    #[test]
    fn draws_exactly_k_distinct_items_from_the_inputs() {
        let sets = vec![set(0..3), set(3..5), set(5..7)];
        let mut rng = StdRng::seed_from_u64(11);

        let result = interleave_questions(sets, 5, &mut rng);

        assert_eq!(result.len(), 5);
        let drawn = numbers(&result);
        assert_eq!(drawn.len(), 5);
        assert!(drawn.iter().all(|n| *n < 7));
    }

    #[test]
    fn exhausts_sets_when_k_exceeds_supply() {
        let sets = vec![set(0..2), set(2..3)];
        let mut rng = StdRng::seed_from_u64(3);

        let result = interleave_questions(sets, 10, &mut rng);

        assert_eq!(result.len(), 3);
        assert_eq!(numbers(&result), HashSet::from([0, 1, 2]));
    }

    #[test]
    fn empty_input_sets_are_ignored() {
        let sets = vec![vec![], set(0..2), vec![]];
        let mut rng = StdRng::seed_from_u64(9);

        let result = interleave_questions(sets, 2, &mut rng);
        assert_eq!(numbers(&result), HashSet::from([0, 1]));
    }

    #[test]
    fn validation_checks_count_and_fields() {
        let complete = set(0..4);
        assert!(validate_quiz(&complete, 4));
        assert!(!validate_quiz(&complete, 5));

        let mut broken = set(0..4);
        broken[2].explanation = None;
        assert!(!validate_quiz(&broken, 4));
    }
}
