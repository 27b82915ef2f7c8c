use serde::Serialize;
use std::path::PathBuf;

/// Cache key: the exact source position a node stands for.
pub type CallerKey = (PathBuf, usize);

/// One entry in the caller tree.
///
/// `children == None` is "not yet expanded"; `Some(vec![])` is "expanded,
/// no callers". Every node instance is owned by exactly one tree position;
/// positions that share a key share cached child content, not instances.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallerNode {
    pub file_path: PathBuf,
    /// 0-based.
    pub line_number: usize,
    pub code_snippet: String,
    pub function_name: String,
    /// Within `[0, 1]`.
    pub confidence: f64,
    pub explanation: String,
    pub children: Option<Vec<CallerNode>>,
    pub loading: bool,
}

impl CallerNode {
    /// Root of a tree: the resolved location of a log record.
    pub fn root(file_path: impl Into<PathBuf>, line_number: usize) -> Self {
        Self {
            file_path: file_path.into(),
            line_number,
            code_snippet: String::new(),
            function_name: String::new(),
            confidence: 1.0,
            explanation: String::new(),
            children: None,
            loading: false,
        }
    }

    pub fn key(&self) -> CallerKey {
        (self.file_path.clone(), self.line_number)
    }

    pub fn is_expanded(&self) -> bool {
        self.children.is_some()
    }

    /// Descend by child indices; `[]` is the node itself.
    pub fn descendant(&self, path: &[usize]) -> Option<&CallerNode> {
        path.iter()
            .try_fold(self, |node, &i| node.children.as_ref()?.get(i))
    }

    pub fn descendant_mut(&mut self, path: &[usize]) -> Option<&mut CallerNode> {
        let mut node = self;
        for &i in path {
            node = node.children.as_mut()?.get_mut(i)?;
        }
        Some(node)
    }

    /// Copy without children, as stored in and handed out by the cache.
    pub(crate) fn shallow(&self) -> Self {
        Self {
            file_path: self.file_path.clone(),
            line_number: self.line_number,
            code_snippet: self.code_snippet.clone(),
            function_name: self.function_name.clone(),
            confidence: self.confidence,
            explanation: self.explanation.clone(),
            children: None,
            loading: false,
        }
    }
}
