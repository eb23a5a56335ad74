//! Outbound notifications to the editor layer.

use tokio::sync::mpsc;
use weft_primitives::{FileId, Version};

use crate::diagnostics::{Diagnostic, Phase};
use crate::resolve::annotate::Annotation;

/// Receives results as they become applicable.
///
/// Called from the resolving thread and from background workers; must not
/// block for long.
pub trait Reporter: Send + Sync {
	/// A phase's diagnostics for `file` changed. `diagnostics` is the full,
	/// editor-ready list for that phase.
	fn diagnostics(&self, file: FileId, phase: Phase, version: Version, diagnostics: Vec<Diagnostic>);

	/// Highlight annotations produced by a resolution pass.
	fn annotations(&self, file: FileId, version: Version, annotations: Vec<Annotation>);

	/// Typecheck results were stored but are not being pushed to the editor;
	/// only an aggregated message view should refresh.
	fn messages_refreshed(&self, _file: FileId) {}
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
	fn diagnostics(&self, _file: FileId, _phase: Phase, _version: Version, _diagnostics: Vec<Diagnostic>) {}

	fn annotations(&self, _file: FileId, _version: Version, _annotations: Vec<Annotation>) {}
}

/// Event emitted by [`ChannelReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisEvent {
	Diagnostics {
		file: FileId,
		phase: Phase,
		version: Version,
		diagnostics: Vec<Diagnostic>,
	},
	Annotations {
		file: FileId,
		version: Version,
		annotations: Vec<Annotation>,
	},
	MessagesRefreshed {
		file: FileId,
	},
}

/// Forwards notifications over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
	tx: mpsc::UnboundedSender<AnalysisEvent>,
}

impl ChannelReporter {
	/// Creates a reporter and the receiving end of its channel.
	pub fn new() -> (Self, mpsc::UnboundedReceiver<AnalysisEvent>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self { tx }, rx)
	}

	fn send(&self, event: AnalysisEvent) {
		if self.tx.send(event).is_err() {
			tracing::trace!("report.channel.closed");
		}
	}
}

impl Reporter for ChannelReporter {
	fn diagnostics(&self, file: FileId, phase: Phase, version: Version, diagnostics: Vec<Diagnostic>) {
		self.send(AnalysisEvent::Diagnostics {
			file,
			phase,
			version,
			diagnostics,
		});
	}

	fn annotations(&self, file: FileId, version: Version, annotations: Vec<Annotation>) {
		self.send(AnalysisEvent::Annotations { file, version, annotations });
	}

	fn messages_refreshed(&self, file: FileId) {
		self.send(AnalysisEvent::MessagesRefreshed { file });
	}
}
