pub mod matrix;
pub mod stream;
pub mod view;

pub use matrix::{Matrix, MatrixRow, TIME_COLUMN};
pub use view::{
    Observable, ObservableSpec, OutputSpec, StreamSpec, View, ViewKind, ViewSink, ViewSpec,
};
