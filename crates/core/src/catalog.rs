//! Read-only lookups over the static module / lesson / test tree.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use thiserror::Error;

use crate::model::{Exercise, Lesson, LessonId, Module, ModuleId, Test, TestId};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("lesson {lesson} not found in module {module}")]
    LessonNotFound { module: ModuleId, lesson: LessonId },

    #[error("test {test} not found in module {module}")]
    TestNotFound { module: ModuleId, test: TestId },

    #[error("duplicate {kind} in catalog: {id}")]
    Duplicate { kind: &'static str, id: String },

    #[error("exercise {exercise} declares type {kind} but carries a different payload")]
    PayloadMismatch { exercise: String, kind: String },

    #[error("test {test} has passing score {score} above 100")]
    InvalidPassingScore { test: TestId, score: u8 },

    #[error("invalid catalog json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read catalog file: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// Lookup misses, as opposed to a malformed catalog.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::ModuleNotFound(_)
                | CatalogError::LessonNotFound { .. }
                | CatalogError::TestNotFound { .. }
        )
    }
}

/// Accessor contract consumed by the services layer.
pub trait ContentCatalog: Send + Sync {
    fn modules(&self) -> &[Module];

    /// # Errors
    ///
    /// Returns `CatalogError::ModuleNotFound` if no module has this slug.
    fn module_by_slug(&self, slug: &str) -> Result<&Module, CatalogError>;

    /// # Errors
    ///
    /// Returns `CatalogError::ModuleNotFound` if the id is unknown.
    fn module_by_id(&self, id: &ModuleId) -> Result<&Module, CatalogError>;

    /// # Errors
    ///
    /// Returns `CatalogError` if the module or lesson is unknown.
    fn lesson_by_id(&self, module_id: &ModuleId, lesson_id: &LessonId)
    -> Result<&Lesson, CatalogError> {
        self.module_by_id(module_id)?
            .lesson(lesson_id)
            .ok_or_else(|| CatalogError::LessonNotFound {
                module: module_id.clone(),
                lesson: lesson_id.clone(),
            })
    }

    /// # Errors
    ///
    /// Returns `CatalogError` if the module or test is unknown.
    fn test_by_id(&self, module_id: &ModuleId, test_id: &TestId) -> Result<&Test, CatalogError> {
        self.module_by_id(module_id)?
            .test(test_id)
            .ok_or_else(|| CatalogError::TestNotFound {
                module: module_id.clone(),
                test: test_id.clone(),
            })
    }

    /// # Errors
    ///
    /// Returns `CatalogError::ModuleNotFound` if the id is unknown.
    fn module_tests(&self, module_id: &ModuleId) -> Result<&[Test], CatalogError> {
        Ok(&self.module_by_id(module_id)?.tests)
    }
}

/// In-memory catalog built once from static data.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    modules: Vec<Module>,
    by_id: HashMap<ModuleId, usize>,
    by_slug: HashMap<String, usize>,
}

impl StaticCatalog {
    /// Index the given modules.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Duplicate` for repeated module ids, slugs, lesson
    /// ids within a module, test ids within a module, or exercise ids within a
    /// lesson or test. Returns `CatalogError::PayloadMismatch` when an exercise
    /// payload does not fit its declared type.
    pub fn new(modules: Vec<Module>) -> Result<Self, CatalogError> {
        let mut by_id = HashMap::with_capacity(modules.len());
        let mut by_slug = HashMap::with_capacity(modules.len());

        for (idx, module) in modules.iter().enumerate() {
            if by_id.insert(module.id.clone(), idx).is_some() {
                return Err(CatalogError::Duplicate {
                    kind: "module id",
                    id: module.id.to_string(),
                });
            }
            if by_slug.insert(module.slug.clone(), idx).is_some() {
                return Err(CatalogError::Duplicate {
                    kind: "module slug",
                    id: module.slug.clone(),
                });
            }
            validate_module(module)?;
        }

        Ok(Self {
            modules,
            by_id,
            by_slug,
        })
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Json` on malformed input, or any validation error from `new`.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let modules: Vec<Module> = serde_json::from_str(json)?;
        Self::new(modules)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Io` if the file cannot be read, otherwise as `from_json`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }
}

fn validate_module(module: &Module) -> Result<(), CatalogError> {
    let mut lesson_ids = HashSet::new();
    for lesson in &module.lessons {
        if !lesson_ids.insert(&lesson.id) {
            return Err(CatalogError::Duplicate {
                kind: "lesson id",
                id: lesson.id.to_string(),
            });
        }
        validate_exercises(&lesson.exercises)?;
    }

    let mut test_ids = HashSet::new();
    for test in &module.tests {
        if !test_ids.insert(&test.id) {
            return Err(CatalogError::Duplicate {
                kind: "test id",
                id: test.id.to_string(),
            });
        }
        if test.passing_score > 100 {
            return Err(CatalogError::InvalidPassingScore {
                test: test.id.clone(),
                score: test.passing_score,
            });
        }
        validate_exercises(&test.exercises)?;
    }
    Ok(())
}

fn validate_exercises(exercises: &[Exercise]) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for exercise in exercises {
        if !seen.insert(&exercise.id) {
            return Err(CatalogError::Duplicate {
                kind: "exercise id",
                id: exercise.id.to_string(),
            });
        }
        if !exercise.content.matches(exercise.kind) {
            return Err(CatalogError::PayloadMismatch {
                exercise: exercise.id.to_string(),
                kind: exercise.kind.to_string(),
            });
        }
    }
    Ok(())
}

impl ContentCatalog for StaticCatalog {
    fn modules(&self) -> &[Module] {
        &self.modules
    }

    fn module_by_slug(&self, slug: &str) -> Result<&Module, CatalogError> {
        self.by_slug
            .get(slug)
            .map(|&idx| &self.modules[idx])
            .ok_or_else(|| CatalogError::ModuleNotFound(slug.to_owned()))
    }

    fn module_by_id(&self, id: &ModuleId) -> Result<&Module, CatalogError> {
        self.by_id
            .get(id)
            .map(|&idx| &self.modules[idx])
            .ok_or_else(|| CatalogError::ModuleNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        {
            "id": "python-basics",
            "slug": "python-basics",
            "title": "Python Basics",
            "lessons": [
                {
                    "id": "variables",
                    "title": "Variables",
                    "content": [
                        {"type": "text", "content": "A variable names a value."},
                        {"type": "code", "language": "python", "content": "x = 1"}
                    ],
                    "exercises": [
                        {
                            "id": "assign",
                            "title": "Assign",
                            "type": "code_writing",
                            "difficulty": "easy",
                            "content": {"solution": "number = 10"}
                        }
                    ]
                }
            ],
            "tests": [
                {
                    "id": "basics-test",
                    "title": "Basics",
                    "time_limit_minutes": 10,
                    "passing_score": 70,
                    "exercises": []
                }
            ]
        }
    ]"#;

    #[test]
    fn lookups_by_slug_and_id() {
        let catalog = StaticCatalog::from_json(CATALOG).unwrap();
        let module = catalog.module_by_slug("python-basics").unwrap();
        assert_eq!(module.title, "Python Basics");

        let id = ModuleId::new("python-basics");
        let lesson = catalog.lesson_by_id(&id, &LessonId::new("variables")).unwrap();
        assert_eq!(lesson.content.len(), 2);

        let test = catalog.test_by_id(&id, &TestId::new("basics-test")).unwrap();
        assert_eq!(test.passing_score, 70);
        assert!(test.revision.is_none());
        assert_eq!(catalog.module_tests(&id).unwrap().len(), 1);
    }

    #[test]
    fn misses_are_not_found_errors() {
        let catalog = StaticCatalog::from_json(CATALOG).unwrap();
        let err = catalog.module_by_slug("rust").unwrap_err();
        assert!(err.is_not_found());

        let err = catalog
            .lesson_by_id(&ModuleId::new("python-basics"), &LessonId::new("loops"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::LessonNotFound { .. }));

        let err = catalog
            .test_by_id(&ModuleId::new("python-basics"), &TestId::new("nope"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn duplicate_slugs_are_rejected() {
        let modules: Vec<Module> = serde_json::from_str(CATALOG).unwrap();
        let mut second = modules[0].clone();
        second.id = ModuleId::new("other");
        let err = StaticCatalog::new(vec![modules[0].clone(), second]).unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate { kind: "module slug", .. }));
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = StaticCatalog::from_json("{not json").unwrap_err();
        assert!(matches!(err, CatalogError::Json(_)));
        assert!(!err.is_not_found());
    }
}
