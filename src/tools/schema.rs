//! Tool declarations sent to the model, and the tool set of every persona.

use super::ToolName;
use crate::assistant::{AssistantDefinition, ToolDeclaration};
use crate::config::{AssistantSettings, PersonaPrompt, Prompts};
use serde_json::{json, Value};

impl ToolName {
    /// Description shown to the model.
    pub fn description(&self) -> &'static str {
        match self {
            ToolName::TauFactor => {
                "Calculate effective diffusivity, tortuosity factors, volume fraction and surface area \
                 from tomographic data/3D voxel image. The function is only suitable for two-phase images."
            }
            ToolName::CreateAndExecutePythonFile => {
                "Creates a Python script file with the provided code and executes it upon the user's consent. \
                 The script is saved with a specified filename, and the user is prompted to allow its execution."
            }
            ToolName::SearchZenodoDatasets => {
                "Searches Zenodo for datasets based on a given query and returns the most relevant results."
            }
            ToolName::ExtractAndOrganizeFiles => {
                "Extracts files from a specified ZIP archive and organizes files with a certain extension \
                 into a designated output folder."
            }
            ToolName::ReadFile => {
                "Reads a file and returns its contents based on the file extension. It supports .csv and .py files. \
                 For .csv files, it returns a list of lists, each representing a row. \
                 For .py files, it returns the file content as a string."
            }
            ToolName::UploadFile => {
                "Uploads a local file to the configured remote storage folder and returns a message \
                 describing where it was stored."
            }
            ToolName::ExtractImagePaths => {
                "Extracts the paths of the TIFF images within a directory, writes the list to a text file \
                 and returns a sentence that includes all the extracted image paths."
            }
            ToolName::FindJson => {
                "Unzips a zip file or searches a directory to find the JSON metadata file. Prompts the user \
                 for confirmation and for the fields to extract. Returns the selected fields of every item \
                 or a message if no metadata is found."
            }
            ToolName::ExtractFilesFromFolderOrZip => {
                "Extracts files with a specified name from a given folder or zip file, including any nested \
                 folders and zip files within. Matching files are copied to a destination folder."
            }
            ToolName::DataAnalysis => {
                "Processes a user query about analyzing all 3D images in a specific directory. Plans the \
                 analysis in steps (extracting image filenames, simulating every image, storing the results \
                 in a CSV file), executes them and returns the final response."
            }
            ToolName::DataFilter => {
                "Guides the user through filtering data from a dataset based on specific criteria: extracts \
                 the dataset metadata, filters it according to the user's criteria and extracts the selected \
                 files. Returns the filtered data names."
            }
            ToolName::ToolReuse => {
                "Reuses a tool included in a Python file: reads the file, adapts the code to the user's needs \
                 and runs it."
            }
        }
    }

    /// JSON schema of the arguments.
    pub fn schema(&self) -> Value {
        match self {
            ToolName::TauFactor => json!({
                "type": "object",
                "properties": {
                    "query_img": {
                        "type": "string",
                        "description": "The path of the tomographic data/3D voxel image to analyse. It always looks like './<filename>.tif', without ./mnt/data."
                    }
                },
                "required": ["query_img"]
            }),
            ToolName::CreateAndExecutePythonFile => json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "String containing the code to be included in the script."
                    },
                    "output_filename": {
                        "type": "string",
                        "description": "Filename for the created Python script. Default is 'created_script.py'."
                    }
                },
                "required": ["code"]
            }),
            ToolName::SearchZenodoDatasets => json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query string to find relevant datasets on Zenodo."
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of search results to return. Default is 10."
                    }
                },
                "required": ["query"]
            }),
            ToolName::ExtractAndOrganizeFiles => json!({
                "type": "object",
                "properties": {
                    "zip_file_path": {
                        "type": "string",
                        "description": "Path to the ZIP file to be extracted. It always looks like './Microstructure.zip', without ./mnt/data."
                    },
                    "output_folder": {
                        "type": "string",
                        "description": "Path to the folder where files with the specified extension will be organized."
                    },
                    "file_extension": {
                        "type": "string",
                        "description": "The file extension of the files to be organized (e.g., 'txt', 'jpg')."
                    }
                },
                "required": ["zip_file_path", "output_folder", "file_extension"]
            }),
            ToolName::ReadFile => json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file to be read. The path looks like './example.csv' or './script.py', without ./mnt/data."
                    }
                },
                "required": ["file_path"]
            }),
            ToolName::UploadFile => json!({
                "type": "object",
                "properties": {
                    "upload_filename": {
                        "type": "string",
                        "description": "The name of the file to be uploaded."
                    },
                    "folder": {
                        "type": "string",
                        "description": "The remote folder the file is uploaded to. Defaults to the configured folder."
                    }
                },
                "required": ["upload_filename"]
            }),
            ToolName::ExtractImagePaths => json!({
                "type": "object",
                "properties": {
                    "directory": {
                        "type": "string",
                        "description": "The local directory to search for image files (e.g., './3DvoxelImage')."
                    }
                },
                "required": ["directory"]
            }),
            ToolName::FindJson => json!({
                "type": "object",
                "properties": {
                    "file_or_dir_path": {
                        "type": "string",
                        "description": "The path to the zip file or directory where the metadata search is performed. It always looks like './<filename>', without mnt/data/."
                    }
                },
                "required": ["file_or_dir_path"]
            }),
            ToolName::ExtractFilesFromFolderOrZip => json!({
                "type": "object",
                "properties": {
                    "source_path": {
                        "type": "string",
                        "description": "Path to the source folder or zip file."
                    },
                    "target_filename": {
                        "type": "string",
                        "description": "Name of the file to search for and extract."
                    },
                    "destination_folder": {
                        "type": "string",
                        "description": "Folder where the extracted files will be stored. Default is 'DATA'."
                    }
                },
                "required": ["source_path", "target_filename"]
            }),
            ToolName::DataAnalysis | ToolName::DataFilter | ToolName::ToolReuse => json!({
                "type": "object",
                "properties": {
                    "user_message": {
                        "type": "string",
                        "description": "The user's request, passed on unchanged."
                    }
                },
                "required": ["user_message"]
            }),
        }
    }

    /// Function declaration for an assistant.
    pub fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::Function {
            name: self.as_str().to_string(),
            description: self.description().to_string(),
            parameters: self.schema(),
        }
    }
}

/// A named assistant with its own instructions and tool set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    /// The assistant the user talks to.
    Main,
    /// Runs the `data_analysis` workflow.
    Data,
    /// Runs the `data_filter` workflow.
    Filter,
    /// Runs the `tool_reuse` workflow.
    ToolReuse,
}

impl Persona {
    /// Tools the persona may call.
    pub fn tools(&self) -> &'static [ToolName] {
        match self {
            Persona::Main => &[
                ToolName::TauFactor,
                ToolName::CreateAndExecutePythonFile,
                ToolName::SearchZenodoDatasets,
                ToolName::ExtractAndOrganizeFiles,
                ToolName::ReadFile,
                ToolName::UploadFile,
                ToolName::ExtractImagePaths,
                ToolName::DataAnalysis,
                ToolName::DataFilter,
                ToolName::ToolReuse,
            ],
            Persona::Data => &[ToolName::TauFactor, ToolName::ExtractImagePaths],
            Persona::Filter => &[ToolName::FindJson, ToolName::ExtractFilesFromFolderOrZip],
            Persona::ToolReuse => &[ToolName::ReadFile, ToolName::CreateAndExecutePythonFile],
        }
    }

    fn prompt<'a>(&self, prompts: &'a Prompts) -> &'a PersonaPrompt {
        match self {
            Persona::Main => &prompts.personas.main,
            Persona::Data => &prompts.personas.data,
            Persona::Filter => &prompts.personas.filter,
            Persona::ToolReuse => &prompts.personas.tool_reuse,
        }
    }

    /// Assistant definition of this persona under the current configuration.
    pub fn definition(&self, prompts: &Prompts, settings: &AssistantSettings) -> AssistantDefinition {
        let prompt = self.prompt(prompts);

        let mut tools = Vec::new();
        if settings.code_interpreter {
            tools.push(ToolDeclaration::CodeInterpreter);
        }
        tools.extend(self.tools().iter().map(ToolName::declaration));

        AssistantDefinition {
            name: prompt.name.clone(),
            instructions: prompts.render_with_custom(&prompt.instructions, &Default::default()),
            model: settings.model.clone(),
            tools,
        }
    }
}
