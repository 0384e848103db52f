//! Persona instructions and workflow prompt templates.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub personas: PersonaPrompts,
    pub workflows: WorkflowPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Name and instructions of one remote assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaPrompt {
    pub name: String,
    pub instructions: String,
}

/// Instructions for every persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaPrompts {
    /// The persona the user talks to.
    pub main: PersonaPrompt,
    /// Sub-assistant behind `data_analysis`.
    pub data: PersonaPrompt,
    /// Sub-assistant behind `data_filter`.
    pub filter: PersonaPrompt,
    /// Sub-assistant behind `tool_reuse`.
    pub tool_reuse: PersonaPrompt,
}

impl Default for PersonaPrompts {
    fn default() -> Self {
        Self {
            main: PersonaPrompt {
                name: "Micro gpt".to_string(),
                instructions: r#"You are an assistant to analyze microstructure. Remember:
1. You can invoke tools for analysing tomographic data.
   For image analysis, call the function once for each path name provided.
   The number of calls corresponds directly to the number of path names you have.
2. After writing code, always use create_and_execute_python_file to save and execute it.
3. If the user asks to analyse all images in a specific folder, use the data_analysis function.
   If the user asks to analyse a single image, use the other functions.
4. If the user asks to filter data in a dataset, e.g. find iron related 3D images in a specific directory, use the data_filter function.
5. If the user asks to reuse a tool that is included in a Python file, use the tool_reuse function."#
                    .to_string(),
            },
            data: PersonaPrompt {
                name: "Data gpt".to_string(),
                instructions: "This assistant will help you to analyse 3D images in a specific directory."
                    .to_string(),
            },
            filter: PersonaPrompt {
                name: "Filter gpt".to_string(),
                instructions: r#"This assistant will help you to filter data based on specific criteria in a dataset. The user does not need to upload the dataset file to this platform; use the given functions directly with the dataset file directory.
IMPORTANT: the directory always looks like './<filename>.zip', without ./mnt/data"#
                    .to_string(),
            },
            tool_reuse: PersonaPrompt {
                name: "Tool reuse gpt".to_string(),
                instructions: r#"This is an assistant to reuse tools. It can modify the code of a file according to the user's needs and then run it.
IMPORTANT: the directory always looks like './<filename>', without ./mnt/data"#
                    .to_string(),
            },
        }
    }
}

/// Prompts for the `data_analysis` workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataAnalysisPrompts {
    pub plan_system: String,
    pub conclusion: String,
}

impl Default for DataAnalysisPrompts {
    fn default() -> Self {
        Self {
            plan_system: r#"Follow these steps to answer the customer queries.
The customer query will be delimited with four hashtags, i.e. {{delimiter}}.

Step 1:{{delimiter}} First, determine if the user is asking a question about analyzing 3D images in a specific directory.
If so, call a function to extract the filenames of images in the directory.

Step 2:{{delimiter}} Next, call a simulation function to analyze the images.

Step 3:{{delimiter}} Finally, store all the data in a CSV file.

Use the following format:
Step 1:{{delimiter}} <step 1 reasoning>
Step 2:{{delimiter}} <step 2 reasoning>
Step 3:{{delimiter}} <step 3 reasoning>

Make sure to include {{delimiter}} to separate every step."#
                .to_string(),
            conclusion: "have a conclusion of the previous steps and response to user in 3 sentences"
                .to_string(),
        }
    }
}

/// Prompts for the `data_filter` workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataFilterPrompts {
    pub plan_system: String,
    /// Prepended to the first step.
    pub path_hint: String,
    /// Question shown to the user before the pattern request.
    pub example_question: String,
    /// Sent after the user answered; `{{example}}` is the answer.
    pub pattern_request: String,
    pub extract_request: String,
}

impl Default for DataFilterPrompts {
    fn default() -> Self {
        Self {
            plan_system: r#"Follow these steps to answer the customer queries.
The customer query will be delimited with four hashtags, i.e. {{delimiter}}.

Step 1:{{delimiter}} First, confirm whether the user is asking you to filter the data in the database based on their criteria.
Determine the directory of the database.
Step 2:{{delimiter}} If the user is asking about filtering 3D images in a dataset, use the find_json function to unfold the zip file, find the metadata of the dataset and extract it.
Step 3:{{delimiter}} Now that you have the metadata in JSON format, focus on the description and keywords within it. Filter all the data in the database that aligns with the user's criteria.

Use the following format:
Step 1:{{delimiter}} <step 1 reasoning>
Step 2:{{delimiter}} <step 2 reasoning>
Step 3:{{delimiter}} <step 3 reasoning>

Make sure to include {{delimiter}} to separate every step."#
                .to_string(),
            path_hint: "the directory always looks like ./<filename>.zip, but not mnt/data/<filename>:\n"
                .to_string(),
            example_question: "Please input an example of a data filename".to_string(),
            pattern_request: r#"The user input an example of a data filename: {{example}}. Based on this example, deduce the pattern of the filenames of the extracted data and list all the filenames of the extracted data.
For instance, if the user inputs 'microstructure039.tif', infer that all data filenames in the dataset follow the pattern './microstructureXYZ.tif', where 'XYZ' is a three-digit number."#
                .to_string(),
            extract_request: "extract the selected data based on their name from the dataset directory, and store them into the DATA folder, with the function extract_files_from_folder_or_zip"
                .to_string(),
        }
    }
}

/// Prompts for the `tool_reuse` workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolReusePrompts {
    pub plan_system: String,
    /// Appended to the first step.
    pub path_hint: String,
}

impl Default for ToolReusePrompts {
    fn default() -> Self {
        Self {
            plan_system: r#"Follow these steps to answer the customer queries.
The customer query will be delimited with four hashtags, i.e. {{delimiter}}.

Step 1:{{delimiter}} First, confirm whether the user wants to reuse a tool created before, by modifying the code of a file according to their needs and then running it. If yes, call the read_file function to read this file, specifying the file path clearly.
Step 2:{{delimiter}} Now that you have the code, make modifications according to the user's requirements.
Step 3:{{delimiter}} Call the create_and_execute_python_file function to save and overwrite the original code, keeping the file name unchanged and clearly specifying the file path.

Use the following format:
Step 1:{{delimiter}} <step 1 reasoning>
Step 2:{{delimiter}} <step 2 reasoning>
Step 3:{{delimiter}} <step 3 reasoning>

Make sure to include {{delimiter}} to separate every step."#
                .to_string(),
            path_hint: "\nIn the code you are writing, make sure the directory always looks like ./<filename>, but not mnt/data/<filename>."
                .to_string(),
        }
    }
}

/// Prompts for all workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct WorkflowPrompts {
    pub data_analysis: DataAnalysisPrompts,
    pub data_filter: DataFilterPrompts,
    pub tool_reuse: ToolReusePrompts,
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let personas_path = custom_path.join("personas.toml");
            if personas_path.exists() {
                let content = std::fs::read_to_string(&personas_path)?;
                prompts.personas = toml::from_str(&content)?;
            }

            let workflows_path = custom_path.join("workflows.toml");
            if workflows_path.exists() {
                let content = std::fs::read_to_string(&workflows_path)?;
                prompts.workflows = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert_eq!(prompts.personas.main.name, "Micro gpt");
        assert!(prompts
            .workflows
            .data_analysis
            .plan_system
            .contains("{{delimiter}}"));
        assert!(prompts
            .workflows
            .data_filter
            .pattern_request
            .contains("{{example}}"));
    }

    #[test]
    fn test_render_template() {
        let template = "Step 1:{{delimiter}} <reasoning> for {{who}}";
        let mut vars = HashMap::new();
        vars.insert("delimiter".to_string(), "####".to_string());
        vars.insert("who".to_string(), "Alice".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(result, "Step 1:#### <reasoning> for Alice");
    }

    #[test]
    fn test_custom_variables_are_overridden() {
        let mut prompts = Prompts::default();
        prompts
            .variables
            .insert("delimiter".to_string(), "%%".to_string());

        let mut vars = HashMap::new();
        vars.insert("delimiter".to_string(), "####".to_string());
        assert_eq!(prompts.render_with_custom("{{delimiter}}", &vars), "####");
        assert_eq!(prompts.render_with_custom("{{delimiter}}", &HashMap::new()), "%%");
    }
}
