//! In-memory document host with a plain-text encoding.
//!
//! Text layout:
//!
//! - paragraphs are separated by blank lines
//! - a line starting with `#` is a heading
//! - `{cite:id|[1]}` / `{group:a,b|[1,2]}` is a marker with its tag and
//!   visible text (the `|text` part is optional)
//!
//! Markers are reported in creation order, not reading order, so callers
//! must rely on [`DocumentHost::compare`] like they would with a real host.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::host::{
    DocumentHost, Heading, HostError, MarkerHandle, Relation, Run, SectionHandle, TaggedMarker,
};
use crate::sync::is_bibliography_heading;

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{((?:cite|group):[^|{}]*)(?:\|([^{}]*))?\}").expect("marker regex is valid")
    })
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Marker {
        handle: MarkerHandle,
        tag: String,
        text: String,
    },
}

#[derive(Debug, Clone)]
enum Block {
    Heading {
        handle: SectionHandle,
        level: usize,
        text: String,
    },
    Paragraph(Vec<Node>),
}

/// Insertion point: before node `node` of block `block`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Cursor {
    block: usize,
    node: usize,
}

#[derive(Debug, Default)]
struct Faults {
    selection_inserts: bool,
    /// Marker insertions still allowed; `None` means unlimited.
    marker_insert_budget: Option<usize>,
    writes: HashSet<MarkerHandle>,
}

impl Faults {
    fn allow_marker_insert(&mut self) -> bool {
        match &mut self.marker_insert_budget {
            None => true,
            Some(0) => false,
            Some(left) => {
                *left -= 1;
                true
            }
        }
    }
}

#[derive(Debug, Default)]
struct State {
    blocks: Vec<Block>,
    next_id: u64,
    selection: Vec<MarkerHandle>,
    cursor: Option<Cursor>,
    managed: Option<SectionHandle>,
    /// Extra heading text that starts the bibliography.
    bibliography_heading: Option<String>,
    faults: Faults,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn locate(&self, handle: MarkerHandle) -> Option<(usize, usize)> {
        self.blocks.iter().enumerate().find_map(|(b, block)| match block {
            Block::Paragraph(nodes) => nodes.iter().position(
                |n| matches!(n, Node::Marker { handle: h, .. } if *h == handle),
            )
            .map(|i| (b, i)),
            Block::Heading { .. } => None,
        })
    }

    fn marker_mut(&mut self, handle: MarkerHandle) -> Result<(&mut String, &mut String), HostError> {
        let (b, i) = self
            .locate(handle)
            .ok_or(HostError::MissingMarker(handle))?;
        match &mut self.blocks[b] {
            Block::Paragraph(nodes) => match &mut nodes[i] {
                Node::Marker { tag, text, .. } => Ok((tag, text)),
                Node::Text(_) => Err(HostError::MissingMarker(handle)),
            },
            Block::Heading { .. } => Err(HostError::MissingMarker(handle)),
        }
    }

    fn heading_index(&self, handle: SectionHandle) -> Option<usize> {
        self.blocks
            .iter()
            .position(|b| matches!(b, Block::Heading { handle: h, .. } if *h == handle))
    }

    /// Inserts `node` at `(block, index)`, keeping the cursor on its content.
    fn insert_node(&mut self, block: usize, index: usize, node: Node) {
        if let Block::Paragraph(nodes) = &mut self.blocks[block] {
            let index = index.min(nodes.len());
            nodes.insert(index, node);
            if let Some(cursor) = &mut self.cursor {
                if cursor.block == block && cursor.node >= index {
                    cursor.node += 1;
                }
            }
        }
    }

    fn starts_bibliography(&self, heading: &str) -> bool {
        is_bibliography_heading(heading)
            || self
                .bibliography_heading
                .as_deref()
                .is_some_and(|h| heading.trim().eq_ignore_ascii_case(h.trim()))
    }

    /// Index of the block where the body stops: the bibliography heading,
    /// or the end of the document.
    fn body_limit(&self) -> usize {
        self.managed
            .and_then(|h| self.heading_index(h))
            .or_else(|| {
                self.blocks.iter().position(
                    |b| matches!(b, Block::Heading { text, .. } if self.starts_bibliography(text)),
                )
            })
            .unwrap_or(self.blocks.len())
    }

    /// Index of the paragraph that ends the document body, creating one if needed.
    fn body_end(&mut self) -> usize {
        let limit = self.body_limit();
        if let Some(last) = self.blocks[..limit]
            .iter()
            .rposition(|b| matches!(b, Block::Paragraph(_)))
        {
            return last;
        }
        self.blocks.insert(limit, Block::Paragraph(Vec::new()));
        if let Some(cursor) = &mut self.cursor {
            if cursor.block >= limit {
                cursor.block += 1;
            }
        }
        limit
    }

    fn tagged(&self, handle: MarkerHandle) -> Option<TaggedMarker> {
        let (b, i) = self.locate(handle)?;
        match &self.blocks[b] {
            Block::Paragraph(nodes) => match &nodes[i] {
                Node::Marker { tag, .. } => Some(TaggedMarker {
                    handle,
                    tag: tag.clone(),
                }),
                Node::Text(_) => None,
            },
            Block::Heading { .. } => None,
        }
    }
}

/// A document held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    state: Mutex<State>,
    compares: AtomicUsize,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a document from its text encoding.
    pub fn parse(text: &str) -> Self {
        let mut state = State::default();
        let mut pending: Vec<&str> = Vec::new();

        for line in text.lines() {
            if line.trim().is_empty() {
                flush_block(&mut state, &mut pending);
            } else {
                pending.push(line);
            }
        }
        flush_block(&mut state, &mut pending);

        Self {
            state: Mutex::new(state),
            compares: AtomicUsize::new(0),
        }
    }

    /// Renders the document back to its text encoding.
    pub fn to_text(&self) -> String {
        let state = self.lock();
        let mut blocks: Vec<String> = Vec::new();
        for block in &state.blocks {
            match block {
                Block::Heading { level, text, .. } => {
                    blocks.push(format!("{} {}", "#".repeat(*level), text));
                }
                Block::Paragraph(nodes) => {
                    let rendered = render_nodes(nodes);
                    if !rendered.trim().is_empty() {
                        blocks.push(rendered);
                    }
                }
            }
        }
        let mut out = blocks.join("\n\n");
        out.push('\n');
        out
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `(tag, text)` of every marker in reading order.
    pub fn marker_texts(&self) -> Vec<(String, String)> {
        let state = self.lock();
        state
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph(nodes) => Some(nodes),
                Block::Heading { .. } => None,
            })
            .flatten()
            .filter_map(|n| match n {
                Node::Marker { tag, text, .. } => Some((tag.clone(), text.clone())),
                Node::Text(_) => None,
            })
            .collect()
    }

    /// Handles of every marker in reading order.
    pub fn markers_in_order(&self) -> Vec<MarkerHandle> {
        let state = self.lock();
        state
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph(nodes) => Some(nodes),
                Block::Heading { .. } => None,
            })
            .flatten()
            .filter_map(|n| match n {
                Node::Marker { handle, .. } => Some(*handle),
                Node::Text(_) => None,
            })
            .collect()
    }

    /// Lines of the section under the first heading named `heading`.
    pub fn section_lines(&self, heading: &str) -> Vec<String> {
        let state = self.lock();
        let Some(start) = state.blocks.iter().position(
            |b| matches!(b, Block::Heading { text, .. } if text.eq_ignore_ascii_case(heading)),
        ) else {
            return Vec::new();
        };
        state.blocks[start + 1..]
            .iter()
            .take_while(|b| matches!(b, Block::Paragraph(_)))
            .filter_map(|b| match b {
                Block::Paragraph(nodes) => Some(render_nodes(nodes)),
                Block::Heading { .. } => None,
            })
            .filter(|line| !line.trim().is_empty())
            .collect()
    }

    /// Replaces the selection with the given markers.
    pub fn select(&self, handles: &[MarkerHandle]) {
        self.lock().selection = handles.to_vec();
    }

    /// Also treats headings named `heading` as the start of the bibliography.
    pub fn with_bibliography_heading(self, heading: &str) -> Self {
        self.lock().bibliography_heading = Some(heading.to_string());
        self
    }

    /// Puts the insertion point at the end of the body, before the
    /// bibliography, leaving a space after any trailing text.
    pub fn place_cursor_at_end(&self) {
        let mut state = self.lock();
        let block = state.body_end();
        let node = match &mut state.blocks[block] {
            Block::Paragraph(nodes) => {
                if needs_space(nodes) {
                    nodes.push(Node::Text(" ".to_string()));
                }
                nodes.len()
            }
            Block::Heading { .. } => 0,
        };
        state.cursor = Some(Cursor { block, node });
    }

    /// Puts the insertion point right after `handle`.
    pub fn place_cursor_after(&self, handle: MarkerHandle) -> Result<(), HostError> {
        let mut state = self.lock();
        let (block, node) = state
            .locate(handle)
            .ok_or(HostError::MissingMarker(handle))?;
        state.cursor = Some(Cursor {
            block,
            node: node + 1,
        });
        Ok(())
    }

    /// Puts the insertion point at the end of the `n`-th paragraph (0-based,
    /// headings not counted).
    pub fn place_cursor_in_paragraph(&self, n: usize) -> Result<(), HostError> {
        let mut state = self.lock();
        let (block, len) = state
            .blocks
            .iter()
            .enumerate()
            .filter_map(|(i, b)| match b {
                Block::Paragraph(nodes) => Some((i, nodes.len())),
                Block::Heading { .. } => None,
            })
            .nth(n)
            .ok_or_else(|| HostError::Rejected(format!("no paragraph {}", n)))?;
        state.cursor = Some(Cursor { block, node: len });
        Ok(())
    }

    /// Makes insertion at the selection fail.
    pub fn reject_selection_inserts(&self) {
        self.lock().faults.selection_inserts = true;
    }

    /// Makes every marker insertion fail.
    pub fn reject_marker_inserts(&self) {
        self.reject_marker_inserts_after(0);
    }

    /// Lets `allowed` more marker insertions through, then fails the rest.
    pub fn reject_marker_inserts_after(&self, allowed: usize) {
        self.lock().faults.marker_insert_budget = Some(allowed);
    }

    /// Makes text/tag writes to `handle` fail.
    pub fn reject_writes_to(&self, handle: MarkerHandle) {
        self.lock().faults.writes.insert(handle);
    }

    /// Number of position comparisons served so far.
    pub fn compare_calls(&self) -> usize {
        self.compares.load(AtomicOrdering::Relaxed)
    }
}

/// Turns a run of non-blank lines into heading and paragraph blocks.
fn flush_block(state: &mut State, pending: &mut Vec<&str>) {
    if pending.is_empty() {
        return;
    }
    let mut body: Vec<&str> = Vec::new();
    for line in pending.drain(..) {
        if let Some(rest) = line.strip_prefix('#') {
            if !body.is_empty() {
                let nodes = parse_nodes(state, &body.join("\n"));
                state.blocks.push(Block::Paragraph(nodes));
                body.clear();
            }
            let level = 1 + rest.chars().take_while(|c| *c == '#').count();
            let handle = SectionHandle(state.next_id());
            state.blocks.push(Block::Heading {
                handle,
                level,
                text: rest.trim_start_matches('#').trim().to_string(),
            });
        } else {
            body.push(line);
        }
    }
    if !body.is_empty() {
        let nodes = parse_nodes(state, &body.join("\n"));
        state.blocks.push(Block::Paragraph(nodes));
    }
}

fn parse_nodes(state: &mut State, text: &str) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut last = 0;
    for cap in marker_regex().captures_iter(text) {
        let Some(whole) = cap.get(0) else { continue };
        if whole.start() > last {
            nodes.push(Node::Text(text[last..whole.start()].to_string()));
        }
        let handle = MarkerHandle(state.next_id());
        nodes.push(Node::Marker {
            handle,
            tag: cap.get(1).map(|m| m.as_str().trim()).unwrap_or_default().to_string(),
            text: cap.get(2).map(|m| m.as_str()).unwrap_or_default().to_string(),
        });
        last = whole.end();
    }
    if last < text.len() {
        nodes.push(Node::Text(text[last..].to_string()));
    }
    nodes
}

/// True when something appended to `nodes` should be set off by a space.
fn needs_space(nodes: &[Node]) -> bool {
    match nodes.last() {
        Some(Node::Text(t)) => !t.ends_with(char::is_whitespace),
        Some(Node::Marker { .. }) => true,
        None => false,
    }
}

fn render_nodes(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Marker { tag, text, .. } if text.is_empty() => {
                out.push('{');
                out.push_str(tag);
                out.push('}');
            }
            Node::Marker { tag, text, .. } => {
                out.push('{');
                out.push_str(tag);
                out.push('|');
                out.push_str(text);
                out.push('}');
            }
        }
    }
    out
}

#[async_trait]
impl DocumentHost for MemoryDocument {
    async fn markers(&self) -> Result<Vec<TaggedMarker>, HostError> {
        let state = self.lock();
        let mut found: Vec<TaggedMarker> = state
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph(nodes) => Some(nodes),
                Block::Heading { .. } => None,
            })
            .flatten()
            .filter_map(|n| match n {
                Node::Marker { handle, tag, .. } => Some(TaggedMarker {
                    handle: *handle,
                    tag: tag.clone(),
                }),
                Node::Text(_) => None,
            })
            .collect();
        found.sort_by_key(|m| m.handle);
        Ok(found)
    }

    async fn compare(&self, a: MarkerHandle, b: MarkerHandle) -> Result<Relation, HostError> {
        self.compares.fetch_add(1, AtomicOrdering::Relaxed);
        if a == b {
            return Ok(Relation::Equal);
        }
        let state = self.lock();
        let pa = state.locate(a).ok_or(HostError::MissingMarker(a))?;
        let pb = state.locate(b).ok_or(HostError::MissingMarker(b))?;
        Ok(match pa.cmp(&pb) {
            Ordering::Less => Relation::Before,
            Ordering::Greater => Relation::After,
            Ordering::Equal => Relation::Same,
        })
    }

    async fn selected_markers(&self) -> Result<Vec<TaggedMarker>, HostError> {
        let state = self.lock();
        let mut selected: Vec<TaggedMarker> = state
            .selection
            .iter()
            .filter_map(|h| state.tagged(*h))
            .collect();
        selected.sort_by_key(|m| m.handle);
        Ok(selected)
    }

    async fn paragraphs(&self) -> Result<Vec<Vec<Run>>, HostError> {
        let state = self.lock();
        Ok(state
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph(nodes) => Some(
                    nodes
                        .iter()
                        .map(|n| match n {
                            Node::Text(t) => Run::Text(t.clone()),
                            Node::Marker { handle, tag, .. } => Run::Marker(TaggedMarker {
                                handle: *handle,
                                tag: tag.clone(),
                            }),
                        })
                        .collect(),
                ),
                Block::Heading { .. } => None,
            })
            .collect())
    }

    async fn set_marker_text(&self, marker: MarkerHandle, text: &str) -> Result<(), HostError> {
        let mut state = self.lock();
        if state.faults.writes.contains(&marker) {
            return Err(HostError::Rejected(format!("marker {} is locked", marker)));
        }
        let (_, current) = state.marker_mut(marker)?;
        *current = text.to_string();
        Ok(())
    }

    async fn rewrite_marker(
        &self,
        marker: MarkerHandle,
        tag: &str,
        text: &str,
    ) -> Result<(), HostError> {
        let mut state = self.lock();
        if state.faults.writes.contains(&marker) {
            return Err(HostError::Rejected(format!("marker {} is locked", marker)));
        }
        let (current_tag, current_text) = state.marker_mut(marker)?;
        *current_tag = tag.to_string();
        *current_text = text.to_string();
        Ok(())
    }

    async fn delete_marker(&self, marker: MarkerHandle) -> Result<(), HostError> {
        let mut state = self.lock();
        let (b, i) = state
            .locate(marker)
            .ok_or(HostError::MissingMarker(marker))?;
        let mut joined = false;
        if let Block::Paragraph(nodes) = &mut state.blocks[b] {
            nodes.remove(i);
            // Glue the text on both sides back together. Whitespace left in
            // front of more whitespace or punctuation goes away.
            if i > 0 && i < nodes.len() {
                if let (Node::Text(_), Node::Text(_)) = (&nodes[i - 1], &nodes[i]) {
                    if let Node::Text(next) = nodes.remove(i) {
                        if let Node::Text(prev) = &mut nodes[i - 1] {
                            let dangling = prev.ends_with(char::is_whitespace)
                                && next.starts_with(|c: char| {
                                    c.is_whitespace() || ",.;:!?)".contains(c)
                                });
                            if dangling {
                                prev.truncate(prev.trim_end().len());
                            }
                            prev.push_str(&next);
                        }
                    }
                    joined = true;
                }
            }
        }
        if let Some(cursor) = &mut state.cursor {
            if cursor.block == b && cursor.node > i {
                cursor.node -= 1;
            }
            if joined && cursor.block == b && cursor.node >= i {
                cursor.node = cursor.node.max(i + 1) - 1;
            }
        }
        state.selection.retain(|h| *h != marker);
        Ok(())
    }

    async fn insert_marker_at_selection(
        &self,
        tag: &str,
        text: &str,
    ) -> Result<MarkerHandle, HostError> {
        let mut state = self.lock();
        if state.faults.selection_inserts {
            return Err(HostError::Rejected("insertion at selection refused".to_string()));
        }
        let cursor = state
            .cursor
            .ok_or_else(|| HostError::Rejected("no insertion point".to_string()))?;
        if !matches!(state.blocks.get(cursor.block), Some(Block::Paragraph(_))) {
            return Err(HostError::Rejected("cannot insert a marker here".to_string()));
        }
        if !state.faults.allow_marker_insert() {
            return Err(HostError::Rejected("insertion at selection refused".to_string()));
        }
        let handle = MarkerHandle(state.next_id());
        state.insert_node(
            cursor.block,
            cursor.node,
            Node::Marker {
                handle,
                tag: tag.to_string(),
                text: text.to_string(),
            },
        );
        Ok(handle)
    }

    async fn insert_marker_at_end(
        &self,
        tag: &str,
        text: &str,
    ) -> Result<MarkerHandle, HostError> {
        let mut state = self.lock();
        if !state.faults.allow_marker_insert() {
            return Err(HostError::Rejected("marker insertion refused".to_string()));
        }
        let block = state.body_end();
        let handle = MarkerHandle(state.next_id());
        if let Block::Paragraph(nodes) = &mut state.blocks[block] {
            if needs_space(nodes) {
                nodes.push(Node::Text(" ".to_string()));
            }
            nodes.push(Node::Marker {
                handle,
                tag: tag.to_string(),
                text: text.to_string(),
            });
        }
        Ok(handle)
    }

    async fn insert_marker_before(
        &self,
        anchor: MarkerHandle,
        tag: &str,
        text: &str,
    ) -> Result<MarkerHandle, HostError> {
        let mut state = self.lock();
        if !state.faults.allow_marker_insert() {
            return Err(HostError::Rejected("marker insertion refused".to_string()));
        }
        let (b, i) = state
            .locate(anchor)
            .ok_or(HostError::MissingMarker(anchor))?;
        let handle = MarkerHandle(state.next_id());
        state.insert_node(
            b,
            i,
            Node::Marker {
                handle,
                tag: tag.to_string(),
                text: text.to_string(),
            },
        );
        Ok(handle)
    }

    async fn insert_text_before(&self, anchor: MarkerHandle, text: &str) -> Result<(), HostError> {
        let mut state = self.lock();
        let (b, i) = state
            .locate(anchor)
            .ok_or(HostError::MissingMarker(anchor))?;
        state.insert_node(b, i, Node::Text(text.to_string()));
        Ok(())
    }

    async fn insert_text_at_selection(&self, text: &str) -> Result<(), HostError> {
        let mut state = self.lock();
        let current = state.cursor;
        let (cursor, text) = match current {
            Some(c) if matches!(state.blocks.get(c.block), Some(Block::Paragraph(_))) => {
                (c, text.to_string())
            }
            _ => {
                // Plain text can always go at the end of the body.
                let block = state.body_end();
                let (node, spaced) = match &state.blocks[block] {
                    Block::Paragraph(nodes) => (nodes.len(), needs_space(nodes)),
                    Block::Heading { .. } => (0, false),
                };
                let text = if spaced {
                    format!(" {}", text)
                } else {
                    text.to_string()
                };
                (Cursor { block, node }, text)
            }
        };
        state.insert_node(cursor.block, cursor.node, Node::Text(text));
        Ok(())
    }

    async fn headings(&self) -> Result<Vec<Heading>, HostError> {
        let state = self.lock();
        Ok(state
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Heading { handle, text, .. } => Some(Heading {
                    handle: *handle,
                    text: text.clone(),
                }),
                Block::Paragraph(_) => None,
            })
            .collect())
    }

    async fn append_heading(&self, text: &str) -> Result<SectionHandle, HostError> {
        let mut state = self.lock();
        let handle = SectionHandle(state.next_id());
        state.blocks.push(Block::Heading {
            handle,
            level: 1,
            text: text.to_string(),
        });
        Ok(handle)
    }

    async fn replace_section(
        &self,
        heading: SectionHandle,
        lines: &[String],
    ) -> Result<(), HostError> {
        let mut state = self.lock();
        let start = state
            .heading_index(heading)
            .ok_or(HostError::MissingSection(heading))?;
        let end = state.blocks[start + 1..]
            .iter()
            .position(|b| matches!(b, Block::Heading { .. }))
            .map(|offset| start + 1 + offset)
            .unwrap_or(state.blocks.len());

        let replacement: Vec<Block> = lines
            .iter()
            .map(|line| Block::Paragraph(vec![Node::Text(line.clone())]))
            .collect();
        let added = replacement.len();
        state.blocks.splice(start + 1..end, replacement);

        let current = state.cursor;
        if let Some(cursor) = current {
            if cursor.block > start && cursor.block < end {
                state.cursor = None;
            } else if cursor.block >= end {
                state.cursor = Some(Cursor {
                    block: cursor.block + added - (end - start - 1),
                    node: cursor.node,
                });
            }
        }
        state.managed = Some(heading);
        Ok(())
    }
}
