use thiserror::Error;

use crate::catalog::CatalogError;
use crate::evaluation::EvaluationError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}
