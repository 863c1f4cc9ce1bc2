use std::thread;

use tracing::warn;

use crate::adb::query_package_detail;
use crate::details::PackageDetail;
use crate::error::{Error, Result};
use crate::state::controller::AppController;
use crate::state::types::AppMessage;

impl AppController {
    /// Fetches `dumpsys` details for one package unless cached or in flight.
    pub(crate) fn request_package_detail(&self, package: &str) -> Result<()> {
        let package_name = package.to_string();
        let device = {
            let mut state = self.state.borrow_mut();
            let Some(device) = state.device.clone() else {
                return Err(Error::NoDevice);
            };
            if state.detail_cache.contains_key(&package_name)
                || state.detail_loading.contains(&package_name)
            {
                return Ok(());
            }
            state.detail_errors.remove(&package_name);
            state.detail_loading.insert(package_name.clone());
            device
        };

        let tool = self.tool.clone();
        let sender = self.sender.clone();
        thread::spawn(move || {
            let result = query_package_detail(&tool, &device, &package_name)
                .map_err(|err| err.to_string());
            let _ = sender.send(AppMessage::DetailLoaded {
                package: package_name,
                result,
            });
        });
        Ok(())
    }

    pub(crate) fn finish_package_detail(
        &self,
        package: String,
        result: std::result::Result<PackageDetail, String>,
    ) {
        let mut state = self.state.borrow_mut();
        state.detail_loading.remove(&package);
        match result {
            Ok(detail) => {
                state.detail_errors.remove(&package);
                state.detail_cache.insert(package, detail);
            }
            Err(err) => {
                warn!(package = %package, error = %err, "package detail query failed");
                state.detail_errors.insert(package, err);
            }
        }
    }

    pub(crate) fn detail_in_flight(&self, package: &str) -> bool {
        self.state.borrow().detail_loading.contains(package)
    }

    pub(crate) fn package_detail(&self, package: &str) -> Option<PackageDetail> {
        self.state.borrow().detail_cache.get(package).cloned()
    }

    pub(crate) fn package_detail_error(&self, package: &str) -> Option<String> {
        self.state.borrow().detail_errors.get(package).cloned()
    }
}
