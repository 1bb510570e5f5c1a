//! Frame plan
//!
//! The order of work inside one command buffer, computed without touching
//! the GPU and then replayed by the render context.

use ash::vk;

use crate::render::renderable::RenderableKey;

/// One step of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOp {
    /// Write the light-space and light uniforms for this slot
    UpdateLightSpace,
    /// Begin the depth-only shadow pass
    BeginShadowPass,
    /// Bind the shadow pipeline and its light-space set
    BindShadowPipeline,
    /// Draw one shadow caster
    DrawShadowCaster(RenderableKey),
    /// End the shadow pass
    EndShadowPass,
    /// Begin the main pass on a swapchain image
    BeginMainPass {
        /// Swapchain image index
        image_index: u32,
    },
    /// Set viewport and scissor to the live extent
    SetViewport(vk::Extent2D),
    /// Draw the skybox
    DrawSkybox,
    /// Draw one renderable
    DrawRenderable(RenderableKey),
    /// Record the diagnostic overlay
    DrawOverlay,
    /// End the main pass
    EndMainPass,
}

/// Per-renderable facts the plan depends on
#[derive(Debug, Clone, Copy)]
pub struct DrawItem {
    /// Renderable handle
    pub key: RenderableKey,
    /// Drawn into the shadow map
    pub casts_shadow: bool,
    /// Descriptor sets are allocated
    pub ready: bool,
}

/// Inputs to [`plan_frame`]
#[derive(Debug, Clone)]
pub struct FrameInputs {
    /// Acquired swapchain image
    pub image_index: u32,
    /// Live swapchain extent
    pub extent: vk::Extent2D,
    /// Camera uses a perspective projection
    pub perspective: bool,
    /// A skybox is set and ready
    pub has_skybox: bool,
    /// Shadow pipeline's set is ready
    pub shadow_ready: bool,
    /// Renderables to draw, in draw order
    pub items: Vec<DrawItem>,
}

/// Shadow pass, then main pass: skybox first, renderables, overlay last
///
/// Renderables whose sets are not ready are left out of both passes.
pub fn plan_frame(inputs: &FrameInputs) -> Vec<PassOp> {
    let mut ops = Vec::with_capacity(inputs.items.len() * 2 + 10);
    ops.push(PassOp::UpdateLightSpace);

    ops.push(PassOp::BeginShadowPass);
    if inputs.shadow_ready {
        ops.push(PassOp::BindShadowPipeline);
        ops.extend(
            inputs
                .items
                .iter()
                .filter(|item| item.ready && item.casts_shadow)
                .map(|item| PassOp::DrawShadowCaster(item.key)),
        );
    }
    ops.push(PassOp::EndShadowPass);

    ops.push(PassOp::BeginMainPass {
        image_index: inputs.image_index,
    });
    ops.push(PassOp::SetViewport(inputs.extent));
    if inputs.perspective && inputs.has_skybox {
        ops.push(PassOp::DrawSkybox);
    }
    ops.extend(
        inputs
            .items
            .iter()
            .filter(|item| item.ready)
            .map(|item| PassOp::DrawRenderable(item.key)),
    );
    ops.push(PassOp::DrawOverlay);
    ops.push(PassOp::EndMainPass);

    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn keys(count: usize) -> Vec<RenderableKey> {
        let mut map: SlotMap<RenderableKey, ()> = SlotMap::with_key();
        (0..count).map(|_| map.insert(())).collect()
    }

    fn inputs(items: Vec<DrawItem>) -> FrameInputs {
        FrameInputs {
            image_index: 1,
            extent: vk::Extent2D { width: 800, height: 600 },
            perspective: true,
            has_skybox: true,
            shadow_ready: true,
            items,
        }
    }

    fn position(ops: &[PassOp], op: PassOp) -> usize {
        ops.iter().position(|o| *o == op).unwrap()
    }

    #[test]
    fn test_shadow_pass_precedes_main_pass() {
        let k = keys(2);
        let ops = plan_frame(&inputs(vec![
            DrawItem { key: k[0], casts_shadow: true, ready: true },
            DrawItem { key: k[1], casts_shadow: true, ready: true },
        ]));

        assert_eq!(ops[0], PassOp::UpdateLightSpace);
        let end_shadow = position(&ops, PassOp::EndShadowPass);
        let first_main_draw = ops
            .iter()
            .position(|op| matches!(op, PassOp::DrawSkybox | PassOp::DrawRenderable(_)))
            .unwrap();
        assert!(end_shadow < position(&ops, PassOp::BeginMainPass { image_index: 1 }));
        assert!(end_shadow < first_main_draw);
        assert!(ops
            .iter()
            .take(end_shadow)
            .all(|op| !matches!(op, PassOp::DrawRenderable(_) | PassOp::DrawSkybox)));
    }

    #[test]
    fn test_non_casters_skip_shadow_pass() {
        let k = keys(2);
        let ops = plan_frame(&inputs(vec![
            DrawItem { key: k[0], casts_shadow: false, ready: true },
            DrawItem { key: k[1], casts_shadow: true, ready: true },
        ]));

        assert!(!ops.contains(&PassOp::DrawShadowCaster(k[0])));
        assert!(ops.contains(&PassOp::DrawShadowCaster(k[1])));
        assert!(ops.contains(&PassOp::DrawRenderable(k[0])));
    }

    #[test]
    fn test_skybox_first_only_for_perspective() {
        let k = keys(1);
        let items = vec![DrawItem { key: k[0], casts_shadow: true, ready: true }];

        let ops = plan_frame(&inputs(items.clone()));
        let sky = position(&ops, PassOp::DrawSkybox);
        assert_eq!(sky, position(&ops, PassOp::SetViewport(vk::Extent2D { width: 800, height: 600 })) + 1);
        assert!(sky < position(&ops, PassOp::DrawRenderable(k[0])));

        let mut ortho = inputs(items);
        ortho.perspective = false;
        assert!(!plan_frame(&ortho).contains(&PassOp::DrawSkybox));
    }

    #[test]
    fn test_unready_items_are_skipped() {
        let k = keys(2);
        let mut frame = inputs(vec![
            DrawItem { key: k[0], casts_shadow: true, ready: false },
            DrawItem { key: k[1], casts_shadow: true, ready: true },
        ]);
        let ops = plan_frame(&frame);
        assert!(!ops.contains(&PassOp::DrawRenderable(k[0])));
        assert!(!ops.contains(&PassOp::DrawShadowCaster(k[0])));

        frame.shadow_ready = false;
        let ops = plan_frame(&frame);
        assert!(!ops.contains(&PassOp::BindShadowPipeline));
        assert!(ops.contains(&PassOp::BeginShadowPass));
        assert!(ops.contains(&PassOp::DrawRenderable(k[1])));
    }

    #[test]
    fn test_overlay_recorded_last_in_main_pass() {
        let k = keys(3);
        let ops = plan_frame(&inputs(
            k.iter().map(|key| DrawItem { key: *key, casts_shadow: false, ready: true }).collect(),
        ));
        let len = ops.len();
        assert_eq!(ops[len - 2], PassOp::DrawOverlay);
        assert_eq!(ops[len - 1], PassOp::EndMainPass);
    }
}
