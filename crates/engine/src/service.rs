use std::path::Path;

use placement_api::{DetectedItem, PlacementClient, ServiceReply};

/// Calls the session makes against the placement service.
pub trait PlacementService {
    fn process_video(
        &self,
        video: &Path,
        image: Option<&Path>,
        prompt: &str,
    ) -> placement_api::Result<ServiceReply>;

    fn analyze(&self, video: &Path, image: Option<&Path>) -> placement_api::Result<ServiceReply>;

    fn generate(
        &self,
        video: &Path,
        image: Option<&Path>,
        targets: &[DetectedItem],
    ) -> placement_api::Result<ServiceReply>;
}

impl PlacementService for PlacementClient {
    fn process_video(
        &self,
        video: &Path,
        image: Option<&Path>,
        prompt: &str,
    ) -> placement_api::Result<ServiceReply> {
        PlacementClient::process_video(self, video, image, prompt)
    }

    fn analyze(&self, video: &Path, image: Option<&Path>) -> placement_api::Result<ServiceReply> {
        PlacementClient::analyze(self, video, image)
    }

    fn generate(
        &self,
        video: &Path,
        image: Option<&Path>,
        targets: &[DetectedItem],
    ) -> placement_api::Result<ServiceReply> {
        PlacementClient::generate(self, video, image, targets)
    }
}
