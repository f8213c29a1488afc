use crate::config::ProblemConfig;
use crate::error::EngineError;
use crate::model::TestCase;

/// Problem store collaborator: supplies the ordered test cases for a
/// problem. Read-only from the engine's perspective.
pub trait ProblemStore: Send + Sync {
    fn test_cases(&self, problem_id: u32) -> Result<Vec<TestCase>, EngineError>;
}

/// Problem store backed by the configuration file's problem list.
pub struct ConfigProblemStore {
    problems: Vec<ProblemConfig>,
}

impl ConfigProblemStore {
    pub fn new(problems: Vec<ProblemConfig>) -> Self {
        Self { problems }
    }
}

impl ProblemStore for ConfigProblemStore {
    fn test_cases(&self, problem_id: u32) -> Result<Vec<TestCase>, EngineError> {
        let problem = self
            .problems
            .iter()
            .find(|p| p.id == problem_id)
            .ok_or(EngineError::ProblemNotFound(problem_id))?;

        Ok(problem
            .cases
            .iter()
            .enumerate()
            .map(|(index, case)| TestCase {
                id: index as u32 + 1,
                input: case.input.clone(),
                expected_output: case.expected_output.clone(),
                hidden: case.hidden,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaseConfig;
    use pretty_assertions::assert_eq;

    fn store() -> ConfigProblemStore {
        ConfigProblemStore::new(vec![ProblemConfig {
            id: 1,
            name: "two-sum".to_string(),
            cases: vec![
                CaseConfig {
                    input: "[2,7,11,15],9".to_string(),
                    expected_output: "[0,1]".to_string(),
                    hidden: false,
                },
                CaseConfig {
                    input: "[3,2,4],6".to_string(),
                    expected_output: "[1,2]".to_string(),
                    hidden: true,
                },
            ],
        }])
    }

    #[test]
    fn returns_cases_in_configured_order() {
        let cases = store().test_cases(1).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].id, 1);
        assert_eq!(cases[0].input, "[2,7,11,15],9");
        assert!(!cases[0].hidden);
        assert!(cases[1].hidden);
    }

    #[test]
    fn unknown_problem_is_not_found() {
        let err = store().test_cases(99).unwrap_err();
        assert!(matches!(err, EngineError::ProblemNotFound(99)));
    }
}
