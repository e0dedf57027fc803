//! The production tree a parsed script turns into.
//!
//! Ownership is strictly tree-shaped: a [`Command`] owns its
//! [`ArgumentList`] and optional [`Block`], a block owns its commands, and
//! so on down. The pieces of state that need *upward* lookup — errors,
//! `ihave` failure flags, declared extension scopes, source offsets — live
//! in a per-script [`Nodes`] registry instead, and every tree node carries
//! its [`NodeId`] into that registry. Parent links are indices, so there is
//! no shared ownership anywhere.

use crate::error::SieveError;
use petrel_mail::Collation;

/// Index of a production in the script's node registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    kind: &'static str,
    start: usize,
    end: usize,
    error: Option<String>,
    ihave_failed: bool,
    extensions: Vec<String>,
}

/// Per-script registry of production state.
///
/// One record per production: parent link, production kind (the human name
/// used in diagnostics), source byte range, error slot, `ihave` failure
/// flag, and the extensions declared at this node. The registry also keeps
/// the script-wide ledger of needed extensions.
#[derive(Debug, Default)]
pub(crate) struct Nodes {
    nodes: Vec<Node>,
    needed: Vec<(NodeId, String)>,
}

impl Nodes {
    /// Creates a new production record and returns its id.
    pub(crate) fn add(&mut self, kind: &'static str, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(Node {
            parent,
            kind,
            start: 0,
            end: 0,
            error: None,
            ihave_failed: false,
            extensions: Vec::new(),
        });
        id
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub(crate) fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub(crate) fn set_start(&mut self, id: NodeId, start: usize) {
        self.node_mut(id).start = start;
    }

    pub(crate) fn set_end(&mut self, id: NodeId, end: usize) {
        self.node_mut(id).end = end;
    }

    pub(crate) fn set_span(&mut self, id: NodeId, start: usize, end: usize) {
        let node = self.node_mut(id);
        node.start = start;
        node.end = end;
    }

    pub(crate) fn span(&self, id: NodeId) -> (usize, usize) {
        let node = self.node(id);
        (node.start, node.end)
    }

    /// Records an error on `id`. The first error wins; a later one is
    /// ignored. An error is refused entirely when the node or one of its
    /// ancestors has failed an `ihave` test, since such a subtree may use
    /// extensions this server knows nothing about.
    pub(crate) fn set_error(&mut self, id: NodeId, message: impl Into<String>) {
        if self.node(id).error.is_some() {
            return;
        }
        if self.in_ihave_failed_scope(id) {
            return;
        }
        self.node_mut(id).error = Some(message.into());
    }

    pub(crate) fn error(&self, id: NodeId) -> Option<&str> {
        self.node(id).error.as_deref()
    }

    pub(crate) fn set_ihave_failed(&mut self, id: NodeId) {
        self.node_mut(id).ihave_failed = true;
    }

    pub(crate) fn ihave_failed(&self, id: NodeId) -> bool {
        self.node(id).ihave_failed
    }

    /// True if `id` or any of its ancestors has failed an `ihave` test.
    pub(crate) fn in_ihave_failed_scope(&self, id: NodeId) -> bool {
        let mut at = Some(id);
        while let Some(p) = at {
            if self.node(p).ihave_failed {
                return true;
            }
            at = self.node(p).parent;
        }
        false
    }

    /// Declares `names` at `id`, skipping names already visible there.
    pub(crate) fn add_extensions(&mut self, id: NodeId, names: &[String]) {
        for name in names {
            if !self.declares_in_scope(id, name) {
                self.node_mut(id).extensions.push(name.clone());
            }
        }
    }

    /// True if `name` is declared at `id` or at any of its ancestors.
    pub(crate) fn declares_in_scope(&self, id: NodeId, name: &str) -> bool {
        let mut at = Some(id);
        while let Some(p) = at {
            if self.node(p).extensions.iter().any(|e| e == name) {
                return true;
            }
            at = self.node(p).parent;
        }
        false
    }

    /// Returns the extensions declared locally at `id`.
    pub(crate) fn extensions_at(&self, id: NodeId) -> &[String] {
        &self.node(id).extensions
    }

    /// Records that the construct at `id` needs `extension`. Whether the
    /// need is satisfied is decided after analysis, not here.
    pub(crate) fn require(&mut self, id: NodeId, extension: &str) {
        self.needed.push((id, extension.to_string()));
    }

    /// Returns the needed-extension ledger.
    pub(crate) fn needed(&self) -> &[(NodeId, String)] {
        &self.needed
    }

    /// Yields every recorded error outside failed `ihave` scopes, sorted by
    /// start offset.
    pub(crate) fn collect_errors(&self) -> Vec<SieveError> {
        let mut errors = Vec::new();
        for (index, node) in self.nodes.iter().enumerate() {
            let Some(message) = &node.error else {
                continue;
            };
            if self.in_ihave_failed_scope(NodeId(index as u32)) {
                continue;
            }
            errors.push(SieveError {
                start: node.start,
                end: node.end,
                production: node.kind,
                message: message.clone(),
            });
        }
        errors.sort_by_key(|e| (e.start, e.end));
        errors
    }

    #[cfg(test)]
    pub(crate) fn kind(&self, id: NodeId) -> &'static str {
        self.node(id).kind
    }

    #[cfg(test)]
    pub(crate) fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(|i| NodeId(i as u32))
    }
}

/// One command: a lower-cased identifier, its arguments, and an optional
/// subsidiary block.
#[derive(Debug)]
pub struct Command {
    pub(crate) node: NodeId,
    pub(crate) identifier: String,
    pub(crate) arguments: ArgumentList,
    pub(crate) block: Option<Block>,
}

impl Command {
    /// Returns the command name, lower-cased.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the command's argument list.
    #[must_use]
    pub fn arguments(&self) -> &ArgumentList {
        &self.arguments
    }

    /// Returns the subsidiary `{...}` block, if the command has one.
    #[must_use]
    pub fn block(&self) -> Option<&Block> {
        self.block.as_ref()
    }
}

/// A `{...}` block of commands.
#[derive(Debug)]
pub struct Block {
    pub(crate) node: NodeId,
    pub(crate) commands: Vec<Command>,
}

impl Block {
    /// Returns the commands in the block, in source order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

/// The arguments of a command or test: raw arguments and sub-tests, each in
/// source order, plus the ordinal cache the analyser fills in when it
/// numbers the positional arguments that remain after tag consumption.
#[derive(Debug)]
pub struct ArgumentList {
    pub(crate) node: NodeId,
    pub(crate) arguments: Vec<Argument>,
    pub(crate) tests: Vec<Test>,
    pub(crate) numbered: Vec<usize>,
}

impl ArgumentList {
    pub(crate) fn new(node: NodeId) -> Self {
        Self {
            node,
            arguments: Vec::new(),
            tests: Vec::new(),
            numbered: Vec::new(),
        }
    }

    /// Returns the raw arguments in source order.
    #[must_use]
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Returns the sub-tests in source order.
    #[must_use]
    pub fn tests(&self) -> &[Test] {
        &self.tests
    }
}

/// The value of one argument: a tag, a number, or a string list. A single
/// string is a list of one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentValue {
    /// A `:tag`, lower-cased, including the leading colon.
    Tag(String),
    /// An unsigned number, multiplier applied.
    Number(u32),
    /// One or more strings.
    StringList(Vec<String>),
}

/// One raw argument.
#[derive(Debug)]
pub struct Argument {
    pub(crate) node: NodeId,
    pub(crate) value: ArgumentValue,
    pub(crate) parsed: bool,
}

impl Argument {
    /// Returns the argument's value.
    #[must_use]
    pub fn value(&self) -> &ArgumentValue {
        &self.value
    }

    /// True once semantic analysis has consumed this argument. After a
    /// successful analysis every argument is either parsed or carries an
    /// error.
    #[must_use]
    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    /// Returns the tag, if this argument is one.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match &self.value {
            ArgumentValue::Tag(t) => Some(t),
            _ => None,
        }
    }
}

/// How a test compares values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchType {
    /// `:is` — exact match. The default.
    #[default]
    Is,
    /// `:contains` — substring match.
    Contains,
    /// `:matches` — glob match with `*` and `?`.
    Matches,
    /// `:value` — relational comparison of values.
    Value,
    /// `:count` — relational comparison of entry counts.
    Count,
}

/// The relational operator for `:value` and `:count` matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relational {
    /// `GT`.
    Gt,
    /// `GE`.
    Ge,
    /// `LT`.
    Lt,
    /// `LE`.
    Le,
    /// `EQ`.
    Eq,
    /// `NE`.
    Ne,
}

/// Which part of an address a test looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressPart {
    /// No address-part tag was given.
    #[default]
    NoAddressPart,
    /// `:all` — the whole address.
    All,
    /// `:localpart`.
    Localpart,
    /// `:domain`.
    Domain,
    /// `:user` — the part before any subaddress separator.
    User,
    /// `:detail` — the subaddress.
    Detail,
}

/// What part of the message a `body` test searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyMatch {
    /// `:text` — decoded text content. The default.
    #[default]
    Text,
    /// `:raw` — the undecoded body.
    Raw,
    /// `:content` — the listed content types only.
    Content,
}

/// One test: a lower-cased identifier, its arguments, and the semantic
/// attributes the analyser fills in.
#[derive(Debug)]
pub struct Test {
    pub(crate) node: NodeId,
    pub(crate) identifier: String,
    pub(crate) arguments: ArgumentList,
    pub(crate) match_type: MatchType,
    pub(crate) relational: Option<Relational>,
    pub(crate) address_part: AddressPart,
    pub(crate) comparator: Option<Collation>,
    pub(crate) body_match: BodyMatch,
    pub(crate) headers: Vec<String>,
    pub(crate) envelope_parts: Vec<String>,
    pub(crate) keys: Vec<String>,
    pub(crate) content_types: Vec<String>,
    pub(crate) date_part: Option<String>,
    pub(crate) zone: Option<String>,
    pub(crate) size_over: bool,
    pub(crate) size_limit: u32,
}

impl Test {
    pub(crate) fn new(node: NodeId, identifier: String, arguments: ArgumentList) -> Self {
        Self {
            node,
            identifier,
            arguments,
            match_type: MatchType::default(),
            relational: None,
            address_part: AddressPart::default(),
            comparator: None,
            body_match: BodyMatch::default(),
            headers: Vec::new(),
            envelope_parts: Vec::new(),
            keys: Vec::new(),
            content_types: Vec::new(),
            date_part: None,
            zone: None,
            size_over: false,
            size_limit: 0,
        }
    }

    /// Returns the test name, lower-cased.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the test's argument list, including sub-tests for `allof`,
    /// `anyof` and `not`.
    #[must_use]
    pub fn arguments(&self) -> &ArgumentList {
        &self.arguments
    }

    /// Returns the match type, `Is` unless a tag said otherwise.
    #[must_use]
    pub fn match_type(&self) -> MatchType {
        self.match_type
    }

    /// Returns the relational operator for `:value`/`:count` matches.
    #[must_use]
    pub fn relational(&self) -> Option<Relational> {
        self.relational
    }

    /// Returns the address part, `NoAddressPart` unless a tag said
    /// otherwise.
    #[must_use]
    pub fn address_part(&self) -> AddressPart {
        self.address_part
    }

    /// Returns the resolved comparator, or `None` for the default
    /// `i;ascii-casemap`.
    #[must_use]
    pub fn comparator(&self) -> Option<Collation> {
        self.comparator
    }

    /// Returns what part of the message a `body` test searches.
    #[must_use]
    pub fn body_match(&self) -> BodyMatch {
        self.body_match
    }

    /// Returns the header field names the test looks at, header-cased.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Returns the envelope parts an `envelope` test looks at, lower-cased.
    #[must_use]
    pub fn envelope_parts(&self) -> &[String] {
        &self.envelope_parts
    }

    /// Returns the keys to search for.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Returns the content types for a `body :content` test.
    #[must_use]
    pub fn content_types(&self) -> &[String] {
        &self.content_types
    }

    /// Returns the date part a `date`/`currentdate` test extracts.
    #[must_use]
    pub fn date_part(&self) -> Option<&str> {
        self.date_part.as_deref()
    }

    /// Returns the zone in `[+-]NNNN` form, `-0000` for `:originalzone`.
    #[must_use]
    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    /// True if a `size` test used `:over`.
    #[must_use]
    pub fn size_over(&self) -> bool {
        self.size_over
    }

    /// Returns the limit of a `size` test.
    #[must_use]
    pub fn size_limit(&self) -> u32 {
        self.size_limit
    }
}
