//! Server resources, scripting and miscellaneous commands.

use super::{params, ResponseFields};
use crate::codec::ZlibCodec;
use crate::error::{Result, SurrenderError};
use crate::protocol::{Variant, VariantMap};
use crate::Session;

/// zlib level used when a negative level asks for the default.
const DEFAULT_TEXTURE_LEVEL: u32 = 6;

impl Session {
    /// Change the server working directory.
    pub async fn cd(&self, path: &str) -> Result<()> {
        self.exec("cd", params([("path", path.into())])).await
    }

    /// The server working directory.
    pub async fn pwd(&self) -> Result<String> {
        let response = self.call("pwd", VariantMap::new()).await?;
        response.str_field("path").map(str::to_string)
    }

    /// Listing of the server working directory.
    pub async fn ls(&self) -> Result<String> {
        let response = self.call("ls", VariantMap::new()).await?;
        response.str_field("listing").map(str::to_string)
    }

    pub async fn set_ressource_path(&self, ressource_path: &str) -> Result<()> {
        self.exec(
            "setRessourcePath",
            params([("ressource_path", ressource_path.into())]),
        )
        .await
    }

    pub async fn get_ressource_path(&self) -> Result<String> {
        let response = self.call("getRessourcePath", VariantMap::new()).await?;
        response.str_field("ressource_path").map(str::to_string)
    }

    /// Server version string.
    pub async fn version(&self) -> Result<String> {
        let response = self.call("version", VariantMap::new()).await?;
        response.str_field("version").map(str::to_string)
    }

    pub async fn close_viewer(&self) -> Result<()> {
        self.call("closeViewer", VariantMap::new()).await.map(drop)
    }

    /// Run Lua code in the server VM and return what it returned, if anything.
    ///
    /// The VM persists across calls.
    pub async fn run_lua_code(&self, code: &str) -> Result<Option<Variant>> {
        let response = self
            .call("runLUACode", params([("code", code.into())]))
            .await?;
        Ok(response.get("return").cloned())
    }

    /// Run a Lua script stored on the server.
    pub async fn run_lua_script(&self, filename: &str) -> Result<Option<Variant>> {
        let response = self
            .call("runLUAScript", params([("filename", filename.into())]))
            .await?;
        Ok(response.get("return").cloned())
    }

    /// Replace the content of a dynamic user texture, one float per pixel.
    ///
    /// `level` is the zlib level (0-9); negative selects the default level.
    pub async fn update_user_data_texture(&self, name: &str, data: &[f32], level: i32) -> Result<()> {
        let level = u32::try_from(level).unwrap_or(DEFAULT_TEXTURE_LEVEL);
        if level > crate::codec::MAX_LEVEL {
            return Err(SurrenderError::InvalidArgument(format!(
                "compression level {} is outside 0-9",
                level
            )));
        }

        let raw: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        let packed = ZlibCodec::compress(&raw, level)?;
        let params = params([("name", name.into()), ("data", Variant::ByteArray(packed))]);
        self.call("updateUserDataTexture", params).await.map(drop)
    }
}
