use bifrost_lsp::Provider;
use rmcp::model::CallToolResult;

use crate::args::CallHierarchyArgs;
use crate::call_hierarchy::{
    CallHierarchy, Direction, HierarchyOptions, build_call_hierarchy, render_tree,
};
use crate::dispatcher::{Dispatcher, json_result, text_result};
use crate::error::ToolError;

impl<P: Provider> Dispatcher<P> {
    async fn call_hierarchy(
        &self,
        args: &CallHierarchyArgs,
        direction: Direction,
        include_packages: Option<Vec<String>>,
    ) -> Result<CallHierarchy, ToolError> {
        let options = HierarchyOptions {
            depth: args.call_level(self.limits.max_call_level),
            include_packages,
            detect_cycles: self.limits.detect_cycles,
        };
        let tree = build_call_hierarchy(
            self.provider.as_ref(),
            &args.text_document.uri,
            args.position,
            direction,
            &options,
        )
        .await?;
        tracing::debug!(
            "{direction:?} call hierarchy: depth {}, {} partial failure(s)",
            options.depth,
            tree.partial_failures
        );
        Ok(tree)
    }

    pub(crate) async fn get_incoming_call_hierarchy(
        &self,
        args: CallHierarchyArgs,
    ) -> Result<CallToolResult, ToolError> {
        let tree = self.call_hierarchy(&args, Direction::Incoming, None).await?;
        json_result(&tree)
    }

    pub(crate) async fn get_outgoing_call_hierarchy(
        &self,
        args: CallHierarchyArgs,
    ) -> Result<CallToolResult, ToolError> {
        let tree = self
            .call_hierarchy(&args, Direction::Outgoing, args.package_filter())
            .await?;
        if !args.ret_simple.unwrap_or(true) {
            return json_result(&tree);
        }
        Ok(match tree.root.as_ref() {
            Some(root) => text_result(render_tree(root)),
            None => text_result(""),
        })
    }
}
